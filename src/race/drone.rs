//! Remote peer mirroring
//!
//! A drone's authoritative state arrives in update messages. A tick that
//! received one takes the message as ground truth; a tick without one
//! dead-reckons by integrating physics from the last known state.

use super::circuit::CircuitData;
use super::laptime::{LapTime, Millis};
use super::physics::{CarPhysics, Kinematics};
use super::progress::LapProgress;
use crate::net::protocol::DroneUpdate;

/// Updates claiming more laps than this beyond the local count are dropped
const MAX_LAP_JUMP: u32 = 100;

/// Result of applying one update
#[derive(Debug, Clone, PartialEq)]
pub enum DroneApply {
    Applied {
        /// Laps closed because the peer moved on to a later lap
        laps_closed: Vec<LapTime>,
        /// Lap counter went backwards; kinematics were applied, lap data kept
        stale_lap: bool,
    },
    Rejected,
}

/// Per-drone link state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DroneLink {
    received: bool,
    /// Lap and elapsed time carried by the last accepted update
    last_elapsed: Option<(u32, Millis)>,
    ticks_since_update: u32,
    updates: u64,
}

impl DroneLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// An update was applied since the last tick ended
    pub fn received_this_tick(&self) -> bool {
        self.received
    }

    /// Ticks dead-reckoned since the last update
    pub fn ticks_since_update(&self) -> u32 {
        self.ticks_since_update
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Overwrite car and lap state from an update
    pub fn apply(
        &mut self,
        update: &DroneUpdate,
        car: &mut CarPhysics,
        progress: &mut LapProgress,
        circuit: &CircuitData,
    ) -> DroneApply {
        if update.lap > progress.lap().saturating_add(MAX_LAP_JUMP) {
            return DroneApply::Rejected;
        }

        let current = *car.kinematics();
        let state = Kinematics {
            x: update.x,
            y: update.y.unwrap_or(current.y),
            z: update.z,
            orientation: update.orientation,
            direction: update.direction,
            speed: update.speed,
            angular_speed: update.angular_speed,
        };
        if !car.set_kinematics(state) {
            return DroneApply::Rejected;
        }

        let mut laps_closed = Vec::new();
        while progress.lap() < update.lap {
            let closing = progress.lap();
            // The just-finished lap takes the peer's time if sent, else the
            // last elapsed time seen for it
            let total = if closing + 1 == update.lap {
                update.last_lap.or(match self.last_elapsed {
                    Some((lap, elapsed)) if lap == closing => Some(elapsed),
                    _ => None,
                })
            } else {
                None
            };
            if let Some(lap) = progress.close_lap(total) {
                laps_closed.push(lap);
            }
        }

        let stale_lap = !progress.overwrite(
            update.lap,
            update.intermediate,
            update.point,
            update.laptime,
            circuit,
        );
        if !stale_lap {
            self.last_elapsed = Some((update.lap, update.laptime));
        }

        self.received = true;
        self.ticks_since_update = 0;
        self.updates += 1;
        DroneApply::Applied {
            laps_closed,
            stale_lap,
        }
    }

    /// Close out the tick
    pub fn end_tick(&mut self) {
        if !self.received {
            self.ticks_since_update = self.ticks_since_update.saturating_add(1);
        }
        self.received = false;
    }
}
