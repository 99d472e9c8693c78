//! Race simulation modules

pub mod ai;
pub mod assist;
pub mod circuit;
pub mod contestant;
pub mod drone;
pub mod laptime;
pub mod physics;
pub mod player;
pub mod progress;
pub mod replay;
pub mod session;
pub mod snapshot;
pub mod terrain;

pub use circuit::{CircuitData, CircuitPoint, GridSlot};
pub use contestant::{Contestant, ContestantId, DriverKind, TickContext};
pub use laptime::{LapTime, Millis, TIME_NOT_SET};
pub use session::{RaceResult, Session, SessionError, SessionMode, TickSummary};
pub use snapshot::{SnapshotBuilder, StandingsSnapshot, WorldSnapshot};
pub use terrain::{CorridorTerrain, OpenGround, Terrain};
