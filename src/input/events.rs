//! Input sample types
//!
//! Platform-independent representation of one controller reading.

use serde::Serialize;

use crate::protocol::{Buttons, NEUTRAL_AXIS};

/// Identifier of an input device, as assigned by the poller
pub type DeviceId = u32;

/// Map a device axis in `[-1.0, 1.0]` onto a wire byte
///
/// -1.0 maps to 0, 0.0 to 127 and 1.0 to 255. Out-of-range and NaN input
/// is clamped.
pub fn axis_to_byte(value: f32) -> u8 {
    let scaled = ((value + 1.0) * 127.5) as i32;
    scaled.clamp(0, 255) as u8
}

/// One controller reading: four stick axes and four buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSample {
    /// Left X, left Y, right X, right Y, each 0..=255
    pub axes: [u8; 4],
    pub buttons: Buttons,
}

impl ControlSample {
    pub fn new(axes: [u8; 4], buttons: [bool; 4]) -> Self {
        Self {
            axes,
            buttons: Buttons::new(buttons),
        }
    }

    /// Centred sticks, nothing pressed
    pub fn neutral() -> Self {
        Self {
            axes: [NEUTRAL_AXIS; 4],
            buttons: Buttons::default(),
        }
    }

    /// Build a sample from raw device axes in `[-1.0, 1.0]`
    pub fn from_raw(axes: [f32; 4], buttons: [bool; 4]) -> Self {
        Self::new(axes.map(axis_to_byte), buttons)
    }
}

impl Default for ControlSample {
    fn default() -> Self {
        Self::neutral()
    }
}

/// A sample tagged with the device that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSample {
    pub device: DeviceId,
    pub sample: ControlSample,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_mapping() {
        assert_eq!(axis_to_byte(-1.0), 0);
        assert_eq!(axis_to_byte(0.0), 127);
        assert_eq!(axis_to_byte(1.0), 255);
        assert_eq!(axis_to_byte(0.5), 191);
    }

    #[test]
    fn test_axis_mapping_clamps() {
        assert_eq!(axis_to_byte(-3.0), 0);
        assert_eq!(axis_to_byte(2.0), 255);
        assert_eq!(axis_to_byte(f32::NAN), 0);
    }

    #[test]
    fn test_from_raw() {
        let sample = ControlSample::from_raw([-1.0, 0.0, 1.0, 0.0], [true, false, false, true]);
        assert_eq!(sample.axes, [0, 127, 255, 127]);
        assert_eq!(sample.buttons.to_bits(), 0b1001);
        assert_eq!(ControlSample::default(), ControlSample::neutral());
    }
}
