//! Racing Core - deterministic racing simulation
//!
//! Car physics, player/AI/drone contestants, lap timing and race standings,
//! driven at a fixed tick rate by an async host.

pub mod config;
pub mod host;
pub mod net;
pub mod race;
pub mod util;
