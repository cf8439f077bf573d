use anyhow::Result;
use crate::ControlConfig;

pub fn check_control(cfg: &ControlConfig) -> Result<()> {
    anyhow::ensure!(cfg.gain().is_finite(), "control.gain must be finite on every axis");
    let db = cfg.deadband();
    anyhow::ensure!(db.is_finite() && db >= 0.0, "control.deadband_rad_s must be finite and >= 0");
    anyhow::ensure!(!cfg.timeout().is_zero(), "control.timeout_ms must be > 0");
    anyhow::ensure!(!cfg.tick().is_zero(), "control.tick_ms must be > 0");
    // the watchdog can only fire on a tick
    anyhow::ensure!(cfg.tick() < cfg.timeout(), "control.tick_ms must be shorter than control.timeout_ms");
    Ok(())
}
