use anyhow::Result;
use tracing::{debug, info};

use crate::gyro::ActuationCommand;
use crate::mode::ControlMode;

/// Motor-side collaborator. Receives rate commands while Manual and is told
/// whenever control changes hands.
pub trait Actuator {
    fn drive(&mut self, cmd: &ActuationCommand) -> Result<()>;

    fn on_mode(&mut self, _mode: ControlMode) -> Result<()> {
        Ok(())
    }
}

/// Stand-in actuator that only logs. Used until a real motor driver is wired in.
#[derive(Debug, Default)]
pub struct TracingActuator {
    driven: u64,
}

impl TracingActuator {
    pub fn driven(&self) -> u64 {
        self.driven
    }
}

impl Actuator for TracingActuator {
    fn drive(&mut self, cmd: &ActuationCommand) -> Result<()> {
        self.driven += 1;
        debug!("actuate: {}", cmd);
        Ok(())
    }

    fn on_mode(&mut self, mode: ControlMode) -> Result<()> {
        match mode {
            ControlMode::Auto => info!("actuator: returning gimbal to automatic control"),
            ControlMode::Manual => info!("actuator: gimbal under manual rate control"),
        }
        Ok(())
    }
}
