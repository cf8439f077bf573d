use std::fmt;
use std::time::Instant;

use crate::gyro::{ActuationCommand, GyroCommandProcessor, GyroSample};
use crate::watchdog::StalenessWatchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Gimbal driven by remote gyro rates.
    Manual,
    /// Gimbal's own controller in charge. Startup state and fallback.
    Auto,
}

impl ControlMode {
    pub const MANUAL_CODE: i64 = 0;
    pub const AUTO_CODE: i64 = 1;

    /// Decode the wire code carried in `setMode`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            Self::MANUAL_CODE => Some(ControlMode::Manual),
            Self::AUTO_CODE => Some(ControlMode::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Manual => f.write_str("MANUAL"),
            ControlMode::Auto => f.write_str("AUTO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// Client sent `setMode`.
    Requested,
    /// No gyro sample within the staleness timeout.
    Timeout,
    /// Transport reported the client went away.
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub from: ControlMode,
    pub to: ControlMode,
    pub cause: TransitionCause,
}

/// Owns the control mode together with the state that must be reset with it:
/// the stored gyro sample and the staleness watchdog.
///
/// Every way into Auto goes through one place so the sample is zeroed and
/// the watchdog forgotten as part of the same step.
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: ControlMode,
    processor: GyroCommandProcessor,
    watchdog: StalenessWatchdog,
}

impl ModeController {
    pub fn new(processor: GyroCommandProcessor, watchdog: StalenessWatchdog) -> Self {
        Self { mode: ControlMode::Auto, processor, watchdog }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Accepted unconditionally. Returns the change, or `None` if the mode
    /// was already `mode`.
    pub fn request_mode(&mut self, mode: ControlMode) -> Option<ModeChange> {
        self.transition(mode, TransitionCause::Requested)
    }

    pub fn on_timeout_tick(&mut self, now: Instant) -> Option<ModeChange> {
        match self.mode {
            ControlMode::Manual if self.watchdog.is_stale(now) => {
                self.transition(ControlMode::Auto, TransitionCause::Timeout)
            }
            _ => None,
        }
    }

    pub fn on_transport_disconnect(&mut self) -> Option<ModeChange> {
        self.transition(ControlMode::Auto, TransitionCause::Disconnect)
    }

    /// Capability to feed gyro samples. Only handed out in Manual.
    pub fn manual(&mut self) -> Option<ManualControl<'_>> {
        match self.mode {
            ControlMode::Manual => Some(ManualControl {
                processor: &mut self.processor,
                watchdog: &mut self.watchdog,
            }),
            ControlMode::Auto => None,
        }
    }

    /// Command for the actuator. Never produced in Auto.
    pub fn actuation_command(&self) -> Option<ActuationCommand> {
        match self.mode {
            ControlMode::Manual => Some(self.processor.compute_command()),
            ControlMode::Auto => None,
        }
    }

    pub fn sample(&self) -> GyroSample {
        self.processor.sample()
    }

    pub fn watchdog(&self) -> &StalenessWatchdog {
        &self.watchdog
    }

    fn transition(&mut self, to: ControlMode, cause: TransitionCause) -> Option<ModeChange> {
        let from = self.mode;
        self.mode = to;

        // reset even when already Auto
        if to == ControlMode::Auto {
            self.processor.clear();
            self.watchdog.reset();
        }

        (from != to).then_some(ModeChange { from, to, cause })
    }
}

/// Borrowed view of the Manual-only half of [`ModeController`].
#[derive(Debug)]
pub struct ManualControl<'a> {
    processor: &'a mut GyroCommandProcessor,
    watchdog: &'a mut StalenessWatchdog,
}

impl ManualControl<'_> {
    /// Deadband and store `raw`, and mark the source fresh as of `now`.
    pub fn ingest(&mut self, raw: GyroSample, now: Instant) -> GyroSample {
        let sample = self.processor.ingest(raw);
        self.watchdog.record_update(now);
        sample
    }
}
