use std::time::{Duration, Instant};

use gimbal_proto::{decode, DecodeError, InboundCommand, SetMode, SetPhoneGyro};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gyro::GyroSample;
use crate::mode::{ControlMode, ModeChange, ModeController};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeError),
    #[error("invalid mode value: {0}")]
    InvalidMode(i64),
    #[error("non-finite gyro rate: {0:?}")]
    NonFiniteRate(GyroSample),
}

/// What a successfully routed message did.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    ModeSet {
        mode: ControlMode,
        change: Option<ModeChange>,
    },
    /// Stored sample after deadbanding.
    GyroAccepted(GyroSample),
    /// Gyro arrived while in Auto. Expected from a client not yet switched over.
    GyroIgnored,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub unknown: u64,
}

/// Decodes inbound frames and routes them into a [`ModeController`].
///
/// Holds no control state of its own; the controller is passed in on each
/// call. Rejected frames leave the controller untouched.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    reject_non_finite: bool,
    gyro_log_interval: Duration,
    last_gyro_log: Option<Instant>,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new(reject_non_finite: bool, gyro_log_interval: Duration) -> Self {
        Self {
            reject_non_finite,
            gyro_log_interval,
            last_gyro_log: None,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn dispatch(
        &mut self,
        ctl: &mut ModeController,
        frame: &[u8],
        now: Instant,
    ) -> Result<Dispatch, DispatchError> {
        let res = self.route(ctl, frame, now);
        match &res {
            Ok(Dispatch::ModeSet { .. }) | Ok(Dispatch::GyroAccepted(_)) => self.stats.accepted += 1,
            Ok(Dispatch::GyroIgnored) => self.stats.ignored += 1,
            Ok(Dispatch::Unknown(cmd)) => {
                self.stats.unknown += 1;
                debug!("ignoring unknown command '{}'", cmd);
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("dropping message: {}", e);
            }
        }
        res
    }

    fn route(
        &mut self,
        ctl: &mut ModeController,
        frame: &[u8],
        now: Instant,
    ) -> Result<Dispatch, DispatchError> {
        match decode(frame)? {
            InboundCommand::SetMode(SetMode { mode }) => {
                let mode = ControlMode::from_code(mode).ok_or(DispatchError::InvalidMode(mode))?;
                let change = ctl.request_mode(mode);
                info!("mode set to: {}", mode);
                Ok(Dispatch::ModeSet { mode, change })
            }
            InboundCommand::SetPhoneGyro(SetPhoneGyro { gx, gy, gz }) => {
                let raw = GyroSample::new(gx, gy, gz);
                match ctl.manual() {
                    Some(mut manual) => {
                        if self.reject_non_finite && !raw.is_finite() {
                            return Err(DispatchError::NonFiniteRate(raw));
                        }
                        let sample = manual.ingest(raw, now);
                        self.log_sample(sample, now);
                        Ok(Dispatch::GyroAccepted(sample))
                    }
                    None => Ok(Dispatch::GyroIgnored),
                }
            }
            InboundCommand::Unknown(cmd) => Ok(Dispatch::Unknown(cmd)),
        }
    }

    fn log_sample(&mut self, sample: GyroSample, now: Instant) {
        let due = match self.last_gyro_log {
            Some(t) => now.saturating_duration_since(t) > self.gyro_log_interval,
            None => true,
        };
        if due {
            debug!("gyro: {}", sample);
            self.last_gyro_log = Some(now);
        }
    }
}
