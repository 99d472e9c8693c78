//! Multiplayer message model consumed by drone contestants

pub mod protocol;

pub use protocol::{DroneUpdate, MessageError, MessageKind, NetMessage, ParamValue};
