use serde::{Deserialize, Serialize};

use crate::Result;

/// One accelerometer + gyroscope reading in device-native units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
}

impl MotionSample {
    pub fn accel_magnitude(&self) -> f32 {
        (self.accel_x * self.accel_x + self.accel_y * self.accel_y + self.accel_z * self.accel_z)
            .sqrt()
    }

    pub fn gyro_magnitude(&self) -> f32 {
        (self.gyro_x * self.gyro_x + self.gyro_y * self.gyro_y + self.gyro_z * self.gyro_z).sqrt()
    }

    /// Tilt angle of gravity in the X/Y plane, normalised to `0.0..=1.0`.
    pub fn tilt_angle(&self) -> f32 {
        use std::f32::consts::PI;
        (self.accel_y.atan2(self.accel_x) + PI) / (2.0 * PI)
    }
}

/// External inertial sensor read once per frame cycle.
///
/// Implementations must return quickly; the frame pipeline calls this on its
/// fixed cadence.
pub trait MotionSource: Send {
    fn read(&mut self) -> Result<MotionSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_quantities() {
        let sample = MotionSample {
            accel_x: 3.0,
            accel_y: 4.0,
            gyro_z: -2.0,
            ..Default::default()
        };
        assert_eq!(sample.accel_magnitude(), 5.0);
        assert_eq!(sample.gyro_magnitude(), 2.0);

        let pointing_left = MotionSample {
            accel_x: -1.0,
            ..Default::default()
        };
        assert!((pointing_left.tilt_angle() - 1.0).abs() < 1e-6);
    }
}
