use serde::Deserialize;
use std::fmt;

use crate::deadband;

/// Tri-axis angular rate, rad/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GyroSample {
    pub const ZERO: GyroSample = GyroSample { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for GyroSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={:.4} Y={:.4} Z={:.4} rad/s", self.x, self.y, self.z)
    }
}

/// Per-axis multipliers from rate to actuation. Configuration only.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GainVector {
    /// Pitch
    pub x: f32,
    /// Roll
    pub y: f32,
    /// Yaw
    pub z: f32,
}

impl Default for GainVector {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0, z: 1.0 }
    }
}

impl GainVector {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// What gets handed to the motor side. Gain-scaled rates per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationCommand {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl fmt::Display for ActuationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x={:.4} y={:.4} z={:.4}", self.x, self.y, self.z)
    }
}

/// Deadbands incoming samples, keeps the latest one, scales it by gain on request.
///
/// Knows nothing about control mode. Callers only reach `ingest` through
/// [`crate::mode::ManualControl`].
#[derive(Debug, Clone)]
pub struct GyroCommandProcessor {
    sample: GyroSample,
    gain: GainVector,
    deadband: f32,
}

impl GyroCommandProcessor {
    pub fn new(gain: GainVector, deadband: f32) -> Self {
        Self { sample: GyroSample::ZERO, gain, deadband }
    }

    pub fn ingest(&mut self, raw: GyroSample) -> GyroSample {
        self.sample = GyroSample {
            x: deadband::apply(raw.x, self.deadband),
            y: deadband::apply(raw.y, self.deadband),
            z: deadband::apply(raw.z, self.deadband),
        };
        self.sample
    }

    pub fn compute_command(&self) -> ActuationCommand {
        ActuationCommand {
            x: self.sample.x * self.gain.x,
            y: self.sample.y * self.gain.y,
            z: self.sample.z * self.gain.z,
        }
    }

    pub fn clear(&mut self) {
        self.sample = GyroSample::ZERO;
    }

    pub fn sample(&self) -> GyroSample {
        self.sample
    }
}
