//! Contestant: one car in a session and its per-tick update cycle
//!
//! Player, AI and drone share the same car, assist and lap bookkeeping and
//! differ only in where control demand comes from and whether physics and lap
//! tracking run locally.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::ai::{AiDriver, AiSkill};
use super::assist::{Assist, DriveAssist, PenaltyEvent};
use super::circuit::{CircuitData, GridSlot};
use super::drone::{DroneApply, DroneLink};
use super::laptime::LapTime;
use super::physics::{CarClass, CarPhysics, CarSpec, Controls};
use super::player::{BindingError, InputSource, PlayerDriver};
use super::progress::LapProgress;
use super::replay::{ReplayBuffer, ReplayFrame};
use super::snapshot::WorldSnapshot;
use super::terrain::Terrain;
use crate::config::{Settings, SpeedUnit};
use crate::net::protocol::DroneUpdate;

pub type ContestantId = Uuid;

/// Everything a contestant may read during a tick
pub struct TickContext<'a> {
    pub dt: f32,
    pub circuit: &'a CircuitData,
    pub terrain: &'a dyn Terrain,
    pub input: &'a dyn InputSource,
    /// Other cars as they were at the start of the tick
    pub world: &'a WorldSnapshot,
    /// Session started and not yet finished
    pub racing: bool,
    /// Laps to finish, RACE mode only
    pub race_laps: Option<u32>,
}

/// Who drives the car
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Player,
    Ai,
    Drone,
}

/// Per-kind driver state
#[derive(Debug, Clone, PartialEq)]
pub enum ContestantKind {
    Player(PlayerDriver),
    Ai(AiDriver),
    Drone(DroneLink),
}

impl ContestantKind {
    pub fn driver_kind(&self) -> DriverKind {
        match self {
            Self::Player(_) => DriverKind::Player,
            Self::Ai(_) => DriverKind::Ai,
            Self::Drone(_) => DriverKind::Drone,
        }
    }
}

/// Noteworthy outcomes of one update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub lap_completed: Option<LapTime>,
    pub new_best: bool,
    /// Finished during this tick
    pub finished: bool,
    pub penalty: Option<PenaltyEvent>,
}

#[derive(Debug, Clone)]
pub struct Contestant {
    id: ContestantId,
    name: String,
    class: CarClass,
    car: CarPhysics,
    assist: Assist,
    kind: ContestantKind,
    progress: LapProgress,
    finished: bool,
    replay: Option<ReplayBuffer>,
    unit: SpeedUnit,
}

impl Contestant {
    fn build(
        id: ContestantId,
        name: String,
        class: CarClass,
        kind: ContestantKind,
        assist: DriveAssist,
        settings: &Settings,
    ) -> Self {
        let replay = (settings.replay_seconds > 0.0)
            .then(|| ReplayBuffer::for_seconds(settings.replay_seconds));
        Self {
            id,
            name,
            class,
            car: CarPhysics::new(CarSpec::for_class(class)),
            assist: Assist::new(assist),
            kind,
            progress: LapProgress::new(0),
            finished: false,
            replay,
            unit: settings.speed_unit,
        }
    }

    /// Human player driving with binding set `control_set`
    pub fn player(
        name: impl Into<String>,
        class: CarClass,
        control_set: usize,
        settings: &Settings,
    ) -> Result<Self, BindingError> {
        let bindings = settings.control_set(control_set)?;
        Ok(Self::build(
            Uuid::new_v4(),
            name.into(),
            class,
            ContestantKind::Player(PlayerDriver::new(bindings)),
            settings.assist,
            settings,
        ))
    }

    /// AI driver whose skill follows `settings.ai_difficulty`
    pub fn ai(name: impl Into<String>, class: CarClass, settings: &Settings) -> Self {
        let skill = AiSkill::from_difficulty(settings.ai_difficulty);
        Self::build(
            Uuid::new_v4(),
            name.into(),
            class,
            ContestantKind::Ai(AiDriver::new(skill)),
            DriveAssist::ai(),
            settings,
        )
    }

    /// Remote peer; `id` is the id its update messages carry
    pub fn drone(
        id: ContestantId,
        name: impl Into<String>,
        class: CarClass,
        settings: &Settings,
    ) -> Self {
        let assist = DriveAssist {
            off_track_penalty: false,
            ..DriveAssist::manual()
        };
        Self::build(
            id,
            name.into(),
            class,
            ContestantKind::Drone(DroneLink::new()),
            assist,
            settings,
        )
    }

    pub fn id(&self) -> ContestantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> CarClass {
        self.class
    }

    pub fn kind(&self) -> &ContestantKind {
        &self.kind
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.kind.driver_kind()
    }

    pub fn is_drone(&self) -> bool {
        matches!(self.kind, ContestantKind::Drone(_))
    }

    pub fn ai_skill(&self) -> Option<&AiSkill> {
        match &self.kind {
            ContestantKind::Ai(ai) => Some(ai.skill()),
            _ => None,
        }
    }

    pub fn car(&self) -> &CarPhysics {
        &self.car
    }

    pub fn progress(&self) -> &LapProgress {
        &self.progress
    }

    pub fn lap(&self) -> u32 {
        self.progress.lap()
    }

    pub fn intermediate(&self) -> usize {
        self.progress.intermediate()
    }

    pub fn point(&self) -> usize {
        self.progress.point()
    }

    pub fn laps(&self) -> &[LapTime] {
        self.progress.laps()
    }

    pub fn best_lap(&self) -> Option<&LapTime> {
        self.progress.best()
    }

    pub fn last_lap(&self) -> Option<&LapTime> {
        self.progress.last_completed()
    }

    /// Single progress figure: `lap * 10000 + intermediate * 1000 + point`
    pub fn distance_score(&self) -> u64 {
        self.lap() as u64 * 10_000 + self.intermediate() as u64 * 1_000 + self.point() as u64
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn penalty_active(&self) -> bool {
        self.assist.penalty_active()
    }

    pub fn assist(&self) -> &Assist {
        &self.assist
    }

    pub fn replay(&self) -> Option<&ReplayBuffer> {
        self.replay.as_ref()
    }

    /// Speed in the configured display unit
    pub fn display_speed(&self) -> f32 {
        self.unit.convert(self.car.speed().abs())
    }

    /// Put the car on a grid slot with fresh lap data
    pub fn place(&mut self, slot: &GridSlot, start_point: usize) {
        self.car.place(slot.x, slot.z, slot.heading);
        self.progress = LapProgress::new(start_point);
        self.assist.reset();
        self.finished = false;
        if let Some(replay) = &mut self.replay {
            replay.clear();
        }
    }

    /// Shift the car by an offset and scale its speed
    pub fn nudge(&mut self, dx: f32, dz: f32, speed_factor: f32) {
        let mut state = *self.car.kinematics();
        state.x += dx;
        state.z += dz;
        state.speed *= speed_factor;
        self.car.set_kinematics(state);
    }

    /// Run one tick: controls, physics, assists, lap data, replay
    pub fn update(&mut self, ctx: &TickContext<'_>) -> TickReport {
        let mut report = TickReport::default();
        let dt = ctx.dt;
        let racing = ctx.racing && !self.finished;
        let received =
            matches!(&self.kind, ContestantKind::Drone(link) if link.received_this_tick());

        let position = *self.car.kinematics();
        let ground = ctx.terrain.ground(position.x, position.z);
        self.car.set_on_track(ground.on_track);
        self.car.set_on_floor(ground.on_floor());
        if let (Some(height), false) = (ground.height, received) {
            self.car.set_height(height);
        }

        let demand = match &mut self.kind {
            ContestantKind::Player(player) if racing => Some(player.read_controls(ctx.input, dt)),
            ContestantKind::Player(player) => Some(player.idle_controls(ctx.input, dt)),
            ContestantKind::Ai(ai) if racing => {
                Some(ai.drive(&mut self.car, self.id, self.progress.point(), ctx))
            }
            ContestantKind::Ai(_) => Some(Controls::default()),
            ContestantKind::Drone(_) => None,
        };
        if let Some(demand) = demand {
            self.assist.before_physics(&mut self.car, demand);
        }

        // A drone that just received its state does not advance it again
        if !received {
            self.car.update_physics(dt);
        }

        if !self.is_drone() {
            report.penalty = self.assist.after_physics(&self.car, dt);
            match report.penalty {
                Some(PenaltyEvent::Started) => {
                    info!(contestant = %self.name, "Off-track penalty started")
                }
                Some(PenaltyEvent::Ended) => {
                    debug!(contestant = %self.name, "Off-track penalty ended")
                }
                None => {}
            }

            if racing {
                let k = *self.car.kinematics();
                let events = self.progress.update(dt, k.x, k.z, ctx.circuit);
                report.lap_completed = events.lap_completed;
                report.new_best = events.new_best;
                if events.lap_completed.is_some() {
                    report.finished = self.check_finish(ctx.race_laps);
                }
            }
        }

        if let Some(replay) = &mut self.replay {
            let k = self.car.kinematics();
            replay.record(
                dt,
                ReplayFrame {
                    x: k.x,
                    y: k.y,
                    z: k.z,
                    direction: k.direction,
                    orientation: k.orientation,
                },
            );
        }

        if let ContestantKind::Drone(link) = &mut self.kind {
            link.end_tick();
        }
        report
    }

    /// Feed a remote update to a drone. Returns `None` when the update is
    /// not for this contestant.
    pub fn message_received(
        &mut self,
        update: &DroneUpdate,
        circuit: &CircuitData,
        race_laps: Option<u32>,
    ) -> Option<DroneApply> {
        if update.id != self.id {
            return None;
        }
        let ContestantKind::Drone(link) = &mut self.kind else {
            return None;
        };
        let result = link.apply(update, &mut self.car, &mut self.progress, circuit);
        if !self.finished {
            self.check_finish(race_laps);
        }
        Some(result)
    }

    fn check_finish(&mut self, race_laps: Option<u32>) -> bool {
        match race_laps {
            Some(laps) if self.progress.lap() > laps => {
                self.finished = true;
                self.car.controls = Controls::default();
                true
            }
            _ => false,
        }
    }
}
