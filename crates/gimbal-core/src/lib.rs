pub mod actuator;
pub mod deadband;
pub mod dispatch;
pub mod doctor;
pub mod gyro;
pub mod mode;
pub mod session;
pub mod watchdog;

use serde::Deserialize;
use std::time::Duration;

pub use actuator::{Actuator, TracingActuator};
pub use dispatch::{CommandDispatcher, Dispatch, DispatchError, DispatchStats};
pub use gyro::{ActuationCommand, GainVector, GyroCommandProcessor, GyroSample};
pub use mode::{ControlMode, ManualControl, ModeChange, ModeController, TransitionCause};
pub use session::{GimbalSession, TickReport};
pub use watchdog::StalenessWatchdog;

pub const DEFAULT_DEADBAND_RAD_S: f32 = 0.01;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_TICK_MS: u64 = 10;
pub const DEFAULT_GYRO_LOG_INTERVAL_MS: u64 = 1000;

/// `[control]` section. Everything is optional; unset fields fall back to
/// the stock firmware constants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlConfig {
    /// Per-axis gain (x = pitch, y = roll, z = yaw). Default 1/1/1.
    pub gain: Option<GainVector>,

    /// Rates below this magnitude (rad/s) are treated as zero.
    pub deadband_rad_s: Option<f32>,

    /// Manual mode falls back to Auto after this long without a gyro sample.
    pub timeout_ms: Option<u64>,

    /// Event loop tick period (staleness check + actuation hand-off).
    pub tick_ms: Option<u64>,

    /// Drop gyro samples carrying inf/NaN instead of passing them through.
    pub reject_non_finite: Option<bool>,

    /// Minimum spacing between debug prints of accepted samples.
    pub gyro_log_interval_ms: Option<u64>,
}

impl ControlConfig {
    pub fn gain(&self) -> GainVector {
        self.gain.unwrap_or_default()
    }

    pub fn deadband(&self) -> f32 {
        self.deadband_rad_s.unwrap_or(DEFAULT_DEADBAND_RAD_S)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.unwrap_or(DEFAULT_TICK_MS))
    }

    pub fn reject_non_finite(&self) -> bool {
        self.reject_non_finite.unwrap_or(true)
    }

    pub fn gyro_log_interval(&self) -> Duration {
        Duration::from_millis(self.gyro_log_interval_ms.unwrap_or(DEFAULT_GYRO_LOG_INTERVAL_MS))
    }
}
