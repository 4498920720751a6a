//! Protocol message definitions
//!
//! Decoded form of every datagram the station sends or receives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a status word is not one of the known modes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);

/// Global operating mode fanned out to every peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Peers idle, control frames are not forwarded
    #[default]
    Standby,
    /// Operator driving, control frames are forwarded
    Active,
    /// Peers run their own routines
    Autonomous,
}

impl Mode {
    /// Status word used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Standby => "standby",
            Mode::Active => "active",
            Mode::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standby" => Ok(Mode::Standby),
            "active" => Ok(Mode::Active),
            "autonomous" => Ok(Mode::Autonomous),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Controller buttons carried in byte 22 of a control frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buttons {
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,
}

impl Buttons {
    pub fn new(pressed: [bool; 4]) -> Self {
        Self {
            cross: pressed[0],
            circle: pressed[1],
            square: pressed[2],
            triangle: pressed[3],
        }
    }

    pub fn to_bits(&self) -> u8 {
        let mut bits = 0u8;
        if self.cross { bits |= 0x01; }
        if self.circle { bits |= 0x02; }
        if self.square { bits |= 0x04; }
        if self.triangle { bits |= 0x08; }
        bits
    }

    /// Bits 4-7 are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            cross: bits & 0x01 != 0,
            circle: bits & 0x02 != 0,
            square: bits & 0x04 != 0,
            triangle: bits & 0x08 != 0,
        }
    }

    pub fn as_array(&self) -> [bool; 4] {
        [self.cross, self.circle, self.square, self.triangle]
    }
}

/// Analog sticks and buttons addressed to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Target peer id, truncated to 15 bytes on the wire
    pub peer_id: String,
    /// Left X, left Y, right X, right Y
    pub axes: [u8; 4],
    pub buttons: Buttons,
}

impl ControlFrame {
    pub fn new(peer_id: impl Into<String>, axes: [u8; 4], buttons: Buttons) -> Self {
        Self {
            peer_id: peer_id.into(),
            axes,
            buttons,
        }
    }
}

/// All possible protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Peer presence broadcast, `ANNOUNCE:<id>:<ip>[:<port>]`
    Announcement {
        peer_id: String,
        /// Address the peer reports, not necessarily the datagram source
        address: IpAddr,
        /// Port the peer waits on for its assignment, if it named one
        port: Option<u16>,
    },

    /// Channel handed to a peer, `ASSIGN:<id>:<channel>`
    Assignment {
        peer_id: String,
        channel: u16,
    },

    /// Mode notification, `<id>:<status>`
    Status {
        peer_id: String,
        status: String,
    },

    /// `STOP` when engaged, `STOP_OFF` when released
    Stop {
        engaged: bool,
    },

    /// 24-byte binary input frame
    Control(ControlFrame),

    /// Anything that did not parse; dropped by the receiver
    Unrecognized,
}

impl Message {
    pub fn status(peer_id: impl Into<String>, mode: Mode) -> Self {
        Message::Status {
            peer_id: peer_id.into(),
            status: mode.as_str().to_string(),
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announcement { .. } => "announcement",
            Message::Assignment { .. } => "assignment",
            Message::Status { .. } => "status",
            Message::Stop { .. } => "stop",
            Message::Control(_) => "control",
            Message::Unrecognized => "unrecognized",
        }
    }

    /// Peer id the message refers to, if any
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            Message::Announcement { peer_id, .. }
            | Message::Assignment { peer_id, .. }
            | Message::Status { peer_id, .. } => Some(peer_id),
            Message::Control(frame) => Some(&frame.peer_id),
            Message::Stop { .. } | Message::Unrecognized => None,
        }
    }
}
