use std::time::Instant;

use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::dispatch::{CommandDispatcher, Dispatch, DispatchError, DispatchStats};
use crate::gyro::{ActuationCommand, GyroCommandProcessor};
use crate::mode::{ControlMode, ModeChange, ModeController, TransitionCause};
use crate::watchdog::StalenessWatchdog;
use crate::ControlConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    pub change: Option<ModeChange>,
    pub command: Option<ActuationCommand>,
}

/// Transport-facing entry points. One of these per process; every call runs
/// to completion before the next, so callers must serialize them.
pub struct GimbalSession<A: Actuator> {
    controller: ModeController,
    dispatcher: CommandDispatcher,
    actuator: A,
}

impl<A: Actuator> GimbalSession<A> {
    pub fn new(cfg: &ControlConfig, actuator: A) -> Self {
        let controller = ModeController::new(
            GyroCommandProcessor::new(cfg.gain(), cfg.deadband()),
            StalenessWatchdog::new(cfg.timeout()),
        );
        let dispatcher = CommandDispatcher::new(cfg.reject_non_finite(), cfg.gyro_log_interval());
        Self { controller, dispatcher, actuator }
    }

    pub fn mode(&self) -> ControlMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn on_connect(&mut self) {
        debug!("transport: client connected (mode={})", self.controller.mode());
    }

    pub fn on_disconnect(&mut self) -> Option<ModeChange> {
        let change = self.controller.on_transport_disconnect();
        if let Some(change) = change {
            self.notify(change);
        }
        change
    }

    pub fn on_message(&mut self, frame: &[u8], now: Instant) -> Result<Dispatch, DispatchError> {
        let out = self.dispatcher.dispatch(&mut self.controller, frame, now)?;
        if let Dispatch::ModeSet { change: Some(change), .. } = &out {
            self.notify(*change);
        }
        Ok(out)
    }

    /// Staleness check first, then actuation, so a timed-out sample is never driven.
    pub fn on_tick(&mut self, now: Instant) -> TickReport {
        let age = self.controller.watchdog().age(now);
        let change = self.controller.on_timeout_tick(now);
        if let Some(change) = change {
            warn!(
                "phone gyro timeout ({:?} since last sample) - returning to AUTO mode",
                age.unwrap_or_default()
            );
            self.notify(change);
        }

        let command = self.controller.actuation_command();
        if let Some(cmd) = &command {
            if let Err(e) = self.actuator.drive(cmd) {
                warn!("actuator drive failed: {:#}", e);
            }
        }

        TickReport { change, command }
    }

    fn notify(&mut self, change: ModeChange) {
        let why = match change.cause {
            TransitionCause::Requested => "requested",
            TransitionCause::Timeout => "gyro timeout",
            TransitionCause::Disconnect => "client disconnected",
        };
        info!("mode {} -> {} ({})", change.from, change.to, why);
        if let Err(e) = self.actuator.on_mode(change.to) {
            warn!("actuator mode hand-over failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gyro::GyroSample;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        driven: Vec<ActuationCommand>,
        modes: Vec<ControlMode>,
        fail_drive: bool,
    }

    impl Actuator for Recorder {
        fn drive(&mut self, cmd: &ActuationCommand) -> anyhow::Result<()> {
            if self.fail_drive {
                anyhow::bail!("motor bus offline");
            }
            self.driven.push(*cmd);
            Ok(())
        }

        fn on_mode(&mut self, mode: ControlMode) -> anyhow::Result<()> {
            self.modes.push(mode);
            Ok(())
        }
    }

    fn session(deadband: f32, timeout_ms: u64) -> GimbalSession<Recorder> {
        let cfg = ControlConfig {
            deadband_rad_s: Some(deadband),
            timeout_ms: Some(timeout_ms),
            ..Default::default()
        };
        GimbalSession::new(&cfg, Recorder::default())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nothing_is_driven_in_auto() {
        let t0 = Instant::now();
        let mut s = session(0.01, 1000);
        s.on_message(br#"{"cmd":"setPhoneGyro","gx":0.5,"gy":0.5,"gz":0.5}"#, t0)
            .unwrap();
        let r = s.on_tick(t0 + ms(10));
        assert_eq!(r, TickReport::default());
        assert!(s.actuator().driven.is_empty());
        assert!(s.actuator().modes.is_empty());
    }

    #[test]
    fn manual_session_drives_every_tick_then_times_out() {
        let t0 = Instant::now();
        let cfg = ControlConfig {
            gain: Some(crate::GainVector { x: 2.0, y: 2.0, z: 2.0 }),
            deadband_rad_s: Some(0.0),
            timeout_ms: Some(1000),
            ..Default::default()
        };
        let mut s = GimbalSession::new(&cfg, Recorder::default());

        s.on_message(br#"{"cmd":"setMode","mode":0}"#, t0).unwrap();
        s.on_message(br#"{"cmd":"setPhoneGyro","gx":0.25,"gy":-0.5,"gz":0.0}"#, t0)
            .unwrap();

        let r = s.on_tick(t0 + ms(10));
        assert_eq!(r.change, None);
        assert_eq!(r.command, Some(ActuationCommand { x: 0.5, y: -1.0, z: 0.0 }));
        s.on_tick(t0 + ms(20));
        assert_eq!(s.actuator().driven.len(), 2);

        let r = s.on_tick(t0 + ms(1001));
        let change = r.change.unwrap();
        assert_eq!(change.cause, TransitionCause::Timeout);
        assert_eq!(r.command, None);
        assert_eq!(s.mode(), ControlMode::Auto);
        assert!(s.controller().sample().is_zero());
        assert_eq!(s.actuator().driven.len(), 2);
        assert_eq!(s.actuator().modes, vec![ControlMode::Manual, ControlMode::Auto]);
    }

    #[test]
    fn disconnect_hands_back_to_auto_once() {
        let t0 = Instant::now();
        let mut s = session(0.0, 1000);
        s.on_connect();
        s.on_message(br#"{"cmd":"setMode","mode":0}"#, t0).unwrap();
        s.on_message(br#"{"cmd":"setPhoneGyro","gx":0.1,"gy":0.1,"gz":0.1}"#, t0)
            .unwrap();

        assert!(s.on_disconnect().is_some());
        assert!(s.on_disconnect().is_none());
        assert_eq!(s.mode(), ControlMode::Auto);
        assert_eq!(s.controller().sample(), GyroSample::ZERO);
        assert_eq!(s.actuator().modes, vec![ControlMode::Manual, ControlMode::Auto]);
    }

    #[test]
    fn repeated_set_mode_notifies_once() {
        let t0 = Instant::now();
        let mut s = session(0.0, 1000);
        s.on_message(br#"{"cmd":"setMode","mode":0}"#, t0).unwrap();
        s.on_message(br#"{"cmd":"setMode","mode":0}"#, t0).unwrap();
        assert_eq!(s.actuator().modes, vec![ControlMode::Manual]);
        assert_eq!(s.stats().accepted, 2);
    }

    #[test]
    fn rejected_message_has_no_side_effects() {
        let t0 = Instant::now();
        let mut s = session(0.0, 1000);
        assert!(s.on_message(br#"{"cmd":"setMode"}"#, t0).is_err());
        assert!(s.on_message(br#"{"cmd":"setMode","mode":5}"#, t0).is_err());
        assert_eq!(s.mode(), ControlMode::Auto);
        assert!(s.actuator().modes.is_empty());
        assert_eq!(s.stats().dropped, 2);
    }

    #[test]
    fn actuator_failure_does_not_stop_the_session() {
        let t0 = Instant::now();
        let mut s = GimbalSession::new(
            &ControlConfig::default(),
            Recorder { fail_drive: true, ..Default::default() },
        );
        s.on_message(br#"{"cmd":"setMode","mode":0}"#, t0).unwrap();
        let r = s.on_tick(t0 + ms(10));
        assert!(r.command.is_some());
        assert_eq!(s.mode(), ControlMode::Manual);
    }
}
