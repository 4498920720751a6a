//! Neutral input source
//!
//! Reports centred sticks for a fixed set of devices. Used when no real
//! poller is attached so paired peers still receive a steady frame stream.

use async_trait::async_trait;

use super::events::{ControlSample, DeviceId, DeviceSample};
use super::traits::{InputResult, InputSource};

/// Input source whose devices never move
#[derive(Debug, Clone, Default)]
pub struct NeutralInput {
    devices: Vec<DeviceId>,
}

impl NeutralInput {
    pub fn new(mut devices: Vec<DeviceId>) -> Self {
        devices.sort_unstable();
        devices.dedup();
        Self { devices }
    }
}

#[async_trait]
impl InputSource for NeutralInput {
    async fn poll(&mut self) -> InputResult<Vec<DeviceSample>> {
        Ok(self
            .devices
            .iter()
            .map(|&device| DeviceSample {
                device,
                sample: ControlSample::neutral(),
            })
            .collect())
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.devices.clone()
    }
}
