//! Protocol module - Defines the datagram protocol spoken with minibots
//!
//! There is no type tag on the wire. Datagrams are told apart by shape:
//! - exactly 24 bytes: binary control frame
//! - `ANNOUNCE:` / `ASSIGN:` prefix: discovery text
//! - `STOP` / `STOP_OFF`: emergency stop literals
//! - anything else with a colon: `<id>:<status>`

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Fixed port every peer broadcasts its announcements to
pub const DISCOVERY_PORT: u16 = 12345;

/// First channel handed out to a newly discovered peer
pub const BASE_CHANNEL: u16 = 12346;

/// Length of a binary control frame
pub const CONTROL_FRAME_LEN: usize = 24;

/// Width of the zero-padded peer id field at the start of a control frame
pub const PEER_ID_FIELD_LEN: usize = 16;

/// Longest peer id (in bytes) that fits a control frame
pub const MAX_FRAME_ID_LEN: usize = PEER_ID_FIELD_LEN - 1;

/// Centred stick value, also used for the two reserved axes
pub const NEUTRAL_AXIS: u8 = 127;

/// Prefix of a peer announcement
pub const ANNOUNCE_PREFIX: &str = "ANNOUNCE:";

/// Prefix of a channel assignment
pub const ASSIGN_PREFIX: &str = "ASSIGN:";

/// Emergency stop engage literal
pub const STOP_TOKEN: &str = "STOP";

/// Emergency stop release literal
pub const RESUME_TOKEN: &str = "STOP_OFF";

/// Largest datagram the station expects to read
pub const MAX_DATAGRAM_SIZE: usize = 1024;
