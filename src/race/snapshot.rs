//! World snapshots for in-tick perception and standings publication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contestant::{Contestant, DriverKind};
use super::laptime::Millis;
use super::session::{Session, SessionMode};
use crate::util::math::heading_vector;

/// Settled state of one car at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarSnapshot {
    pub id: Uuid,
    pub kind: DriverKind,
    pub x: f32,
    pub z: f32,
    pub orientation: f32,
    pub direction: f32,
    pub speed: f32,
    pub lap: u32,
    pub intermediate: usize,
    pub point: usize,
    pub finished: bool,
}

impl CarSnapshot {
    pub fn of(contestant: &Contestant) -> Self {
        let k = contestant.car().kinematics();
        Self {
            id: contestant.id(),
            kind: contestant.driver_kind(),
            x: k.x,
            z: k.z,
            orientation: k.orientation,
            direction: k.direction,
            speed: k.speed,
            lap: contestant.lap(),
            intermediate: contestant.intermediate(),
            point: contestant.point(),
            finished: contestant.is_finished(),
        }
    }

    pub fn velocity(&self) -> (f32, f32) {
        let (dx, dz) = heading_vector(self.direction);
        (dx * self.speed, dz * self.speed)
    }
}

/// Every car's state as of the start of the current tick. Contestants read
/// other cars only through this, never through live state.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub cars: Vec<CarSnapshot>,
}

impl WorldSnapshot {
    pub fn capture<'a>(tick: u64, contestants: impl Iterator<Item = &'a Contestant>) -> Self {
        Self {
            tick,
            cars: contestants.map(CarSnapshot::of).collect(),
        }
    }

    /// All cars except `id`
    pub fn others(&self, id: Uuid) -> impl Iterator<Item = &CarSnapshot> + '_ {
        self.cars.iter().filter(move |c| c.id != id)
    }
}

/// One row of the published standings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingEntry {
    pub position: usize,
    pub id: Uuid,
    pub name: String,
    pub kind: DriverKind,
    pub lap: u32,
    pub intermediate: usize,
    pub point: usize,
    pub best_lap: Option<Millis>,
    pub last_lap: Option<Millis>,
    /// Speed in the contestant's configured display unit
    pub speed: f32,
    pub finished: bool,
    pub penalty: bool,
}

/// Standings as published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsSnapshot {
    pub session_id: Uuid,
    pub tick: u64,
    pub mode: SessionMode,
    pub started: bool,
    pub finished: bool,
    pub fastest_lap: Option<Millis>,
    pub entries: Vec<StandingEntry>,
    pub taken_at: DateTime<Utc>,
}

impl StandingsSnapshot {
    pub fn of(session: &Session) -> Self {
        let entries = session
            .standings()
            .into_iter()
            .enumerate()
            .map(|(i, c)| StandingEntry {
                position: i + 1,
                id: c.id(),
                name: c.name().to_string(),
                kind: c.driver_kind(),
                lap: c.lap(),
                intermediate: c.intermediate(),
                point: c.point(),
                best_lap: c.best_lap().map(|l| l.laptime()),
                last_lap: c.last_lap().map(|l| l.laptime()),
                speed: c.display_speed(),
                finished: c.is_finished(),
                penalty: c.penalty_active(),
            })
            .collect();

        Self {
            session_id: session.id(),
            tick: session.tick(),
            mode: session.mode(),
            started: session.is_started(),
            finished: session.is_finished(),
            fastest_lap: session.fastest_lap().and_then(|c| c.best_lap()).map(|l| l.laptime()),
            entries,
            taken_at: Utc::now(),
        }
    }

    pub fn leader(&self) -> Option<&StandingEntry> {
        self.entries.first()
    }
}

/// Decides when standings are due for publication
pub struct SnapshotBuilder {
    /// Ticks since the last publication
    ticks_since_snapshot: u32,
    /// Publication interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to publish
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Publish on the next check (laps, finishes)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, session: &Session) -> StandingsSnapshot {
        StandingsSnapshot::of(session)
    }
}
