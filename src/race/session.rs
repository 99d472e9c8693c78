//! Session: membership, start/finish lifecycle and standings
//!
//! Membership is fixed once the session starts. Standings are never cached;
//! every query sorts the contestants with the mode's comparator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::circuit::CircuitData;
use super::contestant::{Contestant, ContestantId, DriverKind, TickContext};
use super::drone::DroneApply;
use super::laptime::{Millis, TIME_NOT_SET};
use super::physics::contact_push;
use super::player::InputSource;
use super::snapshot::WorldSnapshot;
use super::terrain::Terrain;
use crate::config::ConfigError;
use crate::net::protocol::{DroneUpdate, MessageError, MessageKind, NetMessage};

/// Fraction of speed kept by cars pushed apart after contact
const CONTACT_SPEED_KEEP: f32 = 0.95;

/// Ranking rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Ranked by best lap
    Time,
    /// Ranked by distance covered
    Race,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Time => "time",
            Self::Race => "race",
        })
    }
}

impl FromStr for SessionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(Self::Time),
            "race" => Ok(Self::Race),
            _ => Err(ConfigError::Invalid("RACE_MODE")),
        }
    }
}

/// Session precondition violations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session already started, contestants can no longer be added")]
    AlreadyStarted,

    #[error("Contestant {0} is not part of this session")]
    NotAMember(ContestantId),

    #[error("Another contestant is already named '{0}'")]
    DuplicateName(String),

    #[error("No contestant at race position {0}")]
    InvalidPosition(usize),
}

/// Counts of notable events in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    pub laps_completed: u32,
    pub finished: u32,
    pub new_fastest: bool,
}

impl TickSummary {
    pub fn is_notable(&self) -> bool {
        self.laps_completed > 0 || self.finished > 0 || self.new_fastest
    }
}

/// Final classification row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub position: usize,
    pub id: ContestantId,
    pub name: String,
    pub kind: DriverKind,
    pub laps_completed: u32,
    pub best_lap: Option<Millis>,
    /// Sum of completed laps, when every one of them was timed
    pub race_time: Option<Millis>,
    pub finished: bool,
    pub recorded_at: DateTime<Utc>,
}

pub struct Session {
    id: Uuid,
    mode: SessionMode,
    laps: u32,
    started: bool,
    finished: bool,
    circuit: Arc<CircuitData>,
    contestants: HashMap<ContestantId, Contestant>,
    /// Ids in the order they were added; grid order
    grid: Vec<ContestantId>,
    finish_order: Vec<ContestantId>,
    tick: u64,
    /// Seconds simulated while racing
    elapsed: f64,
}

impl Session {
    pub fn new(mode: SessionMode, laps: u32, circuit: Arc<CircuitData>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            laps,
            started: false,
            finished: false,
            circuit,
            contestants: HashMap::new(),
            grid: Vec::new(),
            finish_order: Vec::new(),
            tick: 0,
            elapsed: 0.0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn laps(&self) -> u32 {
        self.laps
    }

    pub fn circuit(&self) -> &Arc<CircuitData> {
        &self.circuit
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Started and not yet finished
    pub fn is_racing(&self) -> bool {
        self.started && !self.finished
    }

    pub fn len(&self) -> usize {
        self.contestants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contestants.is_empty()
    }

    fn race_laps(&self) -> Option<u32> {
        (self.mode == SessionMode::Race).then_some(self.laps)
    }

    /// Add a contestant and place it on the next grid slot.
    /// Adding the same contestant again is a no-op returning `Ok(false)`.
    pub fn add_contestant(&mut self, mut contestant: Contestant) -> Result<bool, SessionError> {
        if self.started {
            warn!(
                session = %self.id,
                contestant = %contestant.name(),
                "Rejected contestant, session already started"
            );
            return Err(SessionError::AlreadyStarted);
        }
        if self.contestants.contains_key(&contestant.id()) {
            return Ok(false);
        }
        if self.contestants.values().any(|c| c.name() == contestant.name()) {
            return Err(SessionError::DuplicateName(contestant.name().to_string()));
        }

        let slot = self.circuit.grid_slot(self.grid.len());
        contestant.place(&slot, self.circuit.start_point());
        info!(
            session = %self.id,
            contestant = %contestant.name(),
            kind = ?contestant.driver_kind(),
            grid = self.grid.len() + 1,
            "Contestant added"
        );
        self.grid.push(contestant.id());
        self.contestants.insert(contestant.id(), contestant);
        Ok(true)
    }

    /// Start, or restart, the session
    pub fn set_started(&mut self) {
        self.started = true;
        self.finished = false;
        info!(
            session = %self.id,
            mode = %self.mode,
            laps = self.laps,
            contestants = self.len(),
            "Session started"
        );
    }

    /// Finish the session; a session that never started counts as started
    pub fn set_finished(&mut self) {
        self.started = true;
        self.finished = true;
        info!(session = %self.id, ticks = self.tick, "Session finished");
    }

    pub fn contestant(&self, id: ContestantId) -> Option<&Contestant> {
        self.contestants.get(&id)
    }

    /// Contestants in grid order
    pub fn contestants(&self) -> impl Iterator<Item = &Contestant> + '_ {
        self.grid.iter().filter_map(|id| self.contestants.get(id))
    }

    /// Whether every contestant has finished (RACE mode)
    pub fn all_finished(&self) -> bool {
        !self.contestants.is_empty() && self.contestants.values().all(|c| c.is_finished())
    }

    /// Total order of two contestants under the session's mode
    pub fn compare(&self, a: &Contestant, b: &Contestant) -> Ordering {
        let primary = match self.mode {
            SessionMode::Time => best_millis(a).cmp(&best_millis(b)),
            SessionMode::Race => self
                .progress_key(b)
                .cmp(&self.progress_key(a))
                .then_with(|| self.finish_rank(a).cmp(&self.finish_rank(b))),
        };
        primary
            .then_with(|| a.name().cmp(b.name()))
            .then_with(|| a.id().cmp(&b.id()))
    }

    /// (lap, intermediate, points since the start point).
    ///
    /// The point is counted from the start marker rather than taken raw, so a
    /// car that has wrapped past the last index in the final sector still
    /// ranks ahead of one that has not. On circuits starting at point 0 the
    /// two orders agree.
    fn progress_key(&self, c: &Contestant) -> (u32, usize, usize) {
        (c.lap(), c.intermediate(), c.progress().points_since_start(&self.circuit))
    }

    fn finish_rank(&self, c: &Contestant) -> usize {
        self.finish_order
            .iter()
            .position(|id| *id == c.id())
            .unwrap_or(usize::MAX)
    }

    /// Contestants from first to last
    pub fn standings(&self) -> Vec<&Contestant> {
        let mut ranked: Vec<&Contestant> = self.contestants.values().collect();
        ranked.sort_by(|a, b| self.compare(a, b));
        ranked
    }

    /// 1-based race position of a contestant
    pub fn race_position(&self, id: ContestantId) -> Result<usize, SessionError> {
        let target = self.contestants.get(&id).ok_or(SessionError::NotAMember(id))?;
        let ahead = self
            .contestants
            .values()
            .filter(|c| self.compare(c, target) == Ordering::Less)
            .count();
        Ok(ahead + 1)
    }

    /// Contestant at a 1-based race position
    pub fn contestant_at(&self, position: usize) -> Result<&Contestant, SessionError> {
        position
            .checked_sub(1)
            .and_then(|i| self.standings().get(i).copied())
            .ok_or(SessionError::InvalidPosition(position))
    }

    /// Holder of the fastest lap, if anyone has a timed lap
    pub fn fastest_lap(&self) -> Option<&Contestant> {
        self.contestants
            .values()
            .filter(|c| best_millis(c) != TIME_NOT_SET)
            .min_by(|a, b| {
                best_millis(a)
                    .cmp(&best_millis(b))
                    .then_with(|| a.name().cmp(b.name()))
            })
    }

    /// Fastest lap time, `TIME_NOT_SET` until someone completes a timed lap
    pub fn fastest_laptime(&self) -> Millis {
        self.fastest_lap().map_or(TIME_NOT_SET, best_millis)
    }

    /// Route an inbound message. Returns whether a drone took the update.
    pub fn deliver(&mut self, msg: &NetMessage) -> Result<bool, MessageError> {
        match msg.kind {
            MessageKind::Update => {
                let update = DroneUpdate::from_message(msg)?;
                Ok(self.apply_update(&update))
            }
            kind => {
                debug!(session = %self.id, kind = %kind, "Ignoring message");
                Ok(false)
            }
        }
    }

    /// Hand a decoded update to the drone it names
    pub fn apply_update(&mut self, update: &DroneUpdate) -> bool {
        let race_laps = self.race_laps();
        let Some(contestant) = self.contestants.get_mut(&update.id) else {
            debug!(session = %self.id, id = %update.id, "Update for unknown contestant");
            return false;
        };
        let was_finished = contestant.is_finished();

        match contestant.message_received(update, &self.circuit, race_laps) {
            Some(DroneApply::Applied { laps_closed, stale_lap }) => {
                for lap in &laps_closed {
                    info!(
                        session = %self.id,
                        contestant = %contestant.name(),
                        time = %lap,
                        "Lap completed"
                    );
                }
                if stale_lap {
                    debug!(
                        session = %self.id,
                        contestant = %contestant.name(),
                        lap = update.lap,
                        "Stale lap in update"
                    );
                }
                if !was_finished && contestant.is_finished() {
                    info!(
                        session = %self.id,
                        contestant = %contestant.name(),
                        "Contestant finished"
                    );
                    self.finish_order.push(update.id);
                }
                true
            }
            Some(DroneApply::Rejected) => {
                warn!(session = %self.id, contestant = %contestant.name(), "Rejected drone update");
                false
            }
            None => false,
        }
    }

    /// Advance every contestant by one tick. All contestants read the
    /// same start-of-tick snapshot, so update order does not matter.
    pub fn update(
        &mut self,
        dt: f32,
        terrain: &dyn Terrain,
        input: &dyn InputSource,
    ) -> TickSummary {
        let world = WorldSnapshot::capture(self.tick, self.contestants());
        let circuit = Arc::clone(&self.circuit);
        let ctx = TickContext {
            dt,
            circuit: circuit.as_ref(),
            terrain,
            input,
            world: &world,
            racing: self.is_racing(),
            race_laps: self.race_laps(),
        };
        let fastest_before = self.fastest_laptime();

        let mut summary = TickSummary::default();
        for id in &self.grid {
            let Some(contestant) = self.contestants.get_mut(id) else {
                continue;
            };
            let report = contestant.update(&ctx);

            if let Some(lap) = report.lap_completed {
                summary.laps_completed += 1;
                info!(
                    session = %self.id,
                    contestant = %contestant.name(),
                    lap = contestant.lap().saturating_sub(1),
                    time = %lap,
                    "Lap completed"
                );
                if report.new_best {
                    debug!(
                        session = %self.id,
                        contestant = %contestant.name(),
                        time = %lap,
                        "Personal best"
                    );
                }
            }
            if report.finished {
                summary.finished += 1;
                self.finish_order.push(*id);
                info!(
                    session = %self.id,
                    contestant = %contestant.name(),
                    position = self.finish_order.len(),
                    "Contestant finished"
                );
            }
        }

        self.separate_contacts();

        let fastest = self.fastest_laptime();
        if fastest < fastest_before {
            summary.new_fastest = true;
            if let Some(holder) = self.fastest_lap() {
                info!(
                    session = %self.id,
                    contestant = %holder.name(),
                    time = %super::laptime::format_millis(fastest),
                    "New fastest lap"
                );
            }
        }

        if ctx.racing {
            self.elapsed += dt.max(0.0) as f64;
        }
        self.tick += 1;
        summary
    }

    /// Push apart overlapping cars. Drones are authoritative and never moved.
    fn separate_contacts(&mut self) {
        let cars: Vec<(ContestantId, f32, f32, bool)> = self
            .contestants()
            .map(|c| {
                let k = c.car().kinematics();
                (c.id(), k.x, k.z, c.is_drone())
            })
            .collect();

        for (i, &(id_a, xa, za, drone_a)) in cars.iter().enumerate() {
            for &(id_b, xb, zb, drone_b) in &cars[i + 1..] {
                let Some((px, pz)) = contact_push(xa, za, xb, zb) else {
                    continue;
                };
                let (scale_a, scale_b) = match (drone_a, drone_b) {
                    (true, true) => continue,
                    (false, false) => (1.0, 1.0),
                    (false, true) => (2.0, 0.0),
                    (true, false) => (0.0, 2.0),
                };
                if let Some(a) = self.contestants.get_mut(&id_a).filter(|_| scale_a > 0.0) {
                    a.nudge(-px * scale_a, -pz * scale_a, CONTACT_SPEED_KEEP);
                }
                if let Some(b) = self.contestants.get_mut(&id_b).filter(|_| scale_b > 0.0) {
                    b.nudge(px * scale_b, pz * scale_b, CONTACT_SPEED_KEEP);
                }
            }
        }
    }

    /// Classification as it stands, stamped with the current time
    pub fn results(&self) -> Vec<RaceResult> {
        let recorded_at = Utc::now();
        self.standings()
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let completed: Vec<Millis> = c
                    .laps()
                    .iter()
                    .filter(|l| l.is_complete())
                    .map(|l| l.laptime())
                    .collect();
                let all_timed = completed.iter().all(|t| *t != TIME_NOT_SET);
                let race_time = (!completed.is_empty() && all_timed)
                    .then(|| completed.iter().fold(0u32, |acc, t| acc.saturating_add(*t)));
                RaceResult {
                    position: i + 1,
                    id: c.id(),
                    name: c.name().to_string(),
                    kind: c.driver_kind(),
                    laps_completed: completed.len() as u32,
                    best_lap: c.best_lap().map(|l| l.laptime()),
                    race_time,
                    finished: c.is_finished(),
                    recorded_at,
                }
            })
            .collect()
    }
}

fn best_millis(c: &Contestant) -> Millis {
    c.best_lap().map_or(TIME_NOT_SET, |l| l.laptime())
}
