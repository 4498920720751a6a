//! Operator console - thin presentation layer over the station
//!
//! Owns what the network core deliberately does not: the pairing between
//! peers and input devices, and the parsing of operator commands.

mod command;
mod pairing;

pub use command::*;
pub use pairing::*;
