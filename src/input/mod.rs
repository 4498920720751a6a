//! Input module - Normalized controller samples fed to the station
//!
//! Device polling itself lives outside the core. This module defines:
//! - The per-tick sample a device produces
//! - The trait a poller implements
//! - A neutral source reporting centred sticks

mod events;
mod neutral;
mod traits;

pub use events::*;
pub use neutral::*;
pub use traits::*;
