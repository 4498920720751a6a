//! Minibot Station - network core of the minibot operator console
//!
//! Discovers peers over UDP, hands each one a private channel, tracks
//! their liveness and forwards mode, emergency stop and controller input.

pub mod config;
pub mod console;
pub mod input;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod session;

pub use network::{CommandDispatcher, Station, StationConfig, StationError, StationEvent};
pub use protocol::{Message, Mode};
