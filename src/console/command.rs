//! Operator command parsing
//!
//! One command per line on stdin, e.g. `active`, `stop`, `pair R1 0`.

use std::str::FromStr;
use thiserror::Error;

use crate::input::DeviceId;
use crate::protocol::Mode;

/// Errors produced while parsing an operator command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid device id: {0}")]
    InvalidDevice(String),
}

/// Something the operator asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Switch mode and broadcast it
    SetMode(Mode),
    /// Engage (`true`) or release the emergency stop
    Stop(bool),
    ToggleStop,
    Pair { peer_id: String, device: DeviceId },
    Unpair { peer_id: String },
    /// Print the peer table
    Peers,
    /// Forget all peers and pairings
    Refresh,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Empty);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("1" | "standby", []) => ConsoleCommand::SetMode(Mode::Standby),
            ("2" | "active" | "teleop", []) => ConsoleCommand::SetMode(Mode::Active),
            ("3" | "auto" | "autonomous", []) => ConsoleCommand::SetMode(Mode::Autonomous),
            ("stop" | "estop", []) => ConsoleCommand::Stop(true),
            ("resume", []) => ConsoleCommand::Stop(false),
            ("toggle" | "space", []) => ConsoleCommand::ToggleStop,
            ("pair", [peer_id, device]) => ConsoleCommand::Pair {
                peer_id: peer_id.to_string(),
                device: device
                    .parse()
                    .map_err(|_| CommandError::InvalidDevice(device.to_string()))?,
            },
            ("pair", _) => return Err(CommandError::Usage("pair <peer> <device>")),
            ("unpair", [peer_id]) => ConsoleCommand::Unpair {
                peer_id: peer_id.to_string(),
            },
            ("unpair", _) => return Err(CommandError::Usage("unpair <peer>")),
            ("peers" | "ls", []) => ConsoleCommand::Peers,
            ("refresh", []) => ConsoleCommand::Refresh,
            ("help" | "?", []) => ConsoleCommand::Help,
            ("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };
        Ok(command)
    }
}

/// Text printed for `help`
pub const HELP: &str = "\
Commands:
  standby | active | auto     set mode (also 1 / 2 / 3)
  stop | resume | toggle      emergency stop
  pair <peer> <device>        drive a peer with an input device
  unpair <peer>
  peers                       show known peers as JSON
  refresh                     forget all peers and pairings
  quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("active".parse::<ConsoleCommand>(), Ok(ConsoleCommand::SetMode(Mode::Active)));
        assert_eq!("  2 ".parse::<ConsoleCommand>(), Ok(ConsoleCommand::SetMode(Mode::Active)));
        assert_eq!("AUTO".parse::<ConsoleCommand>(), Ok(ConsoleCommand::SetMode(Mode::Autonomous)));
        assert_eq!("1".parse::<ConsoleCommand>(), Ok(ConsoleCommand::SetMode(Mode::Standby)));
    }

    #[test]
    fn test_parse_pairing() {
        assert_eq!(
            "pair R1 0".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Pair { peer_id: "R1".to_string(), device: 0 })
        );
        assert_eq!(
            "pair R1".parse::<ConsoleCommand>(),
            Err(CommandError::Usage("pair <peer> <device>"))
        );
        assert_eq!(
            "pair R1 pad".parse::<ConsoleCommand>(),
            Err(CommandError::InvalidDevice("pad".to_string()))
        );
        assert_eq!(
            "unpair R1".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Unpair { peer_id: "R1".to_string() })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ConsoleCommand>(), Err(CommandError::Empty));
        assert_eq!(
            "stop now".parse::<ConsoleCommand>(),
            Err(CommandError::Unknown("stop now".to_string()))
        );
        assert_eq!("resume".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Stop(false)));
        assert_eq!("q".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Quit));
    }
}
