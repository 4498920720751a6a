//! Input trait definitions
//!
//! Defines the interface a controller poller provides to the console.

use async_trait::async_trait;
use thiserror::Error;

use super::events::{DeviceId, DeviceSample};

/// Errors that can occur while polling input devices
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Device backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InputResult<T> = Result<T, InputError>;

/// Source of normalized controller samples, polled once per control tick
#[async_trait]
pub trait InputSource: Send {
    /// Latest sample of every connected device
    async fn poll(&mut self) -> InputResult<Vec<DeviceSample>>;

    /// Devices currently connected
    fn devices(&self) -> Vec<DeviceId>;

    /// Human-readable name of a device
    fn device_name(&self, device: DeviceId) -> Option<String> {
        self.devices()
            .contains(&device)
            .then(|| format!("controller {}", device))
    }
}
