//! Pin multiplexing through the external `config-pin` helper
//!
//! Header pins come up in their default (usually GPIO) function. PWM and UART
//! pins have to be switched over first, which the stock image does with the
//! `config-pin <pin> <mode>` program.

use std::fmt;
use std::process::Command;

use log::{debug, error};

use crate::{DriverError, Result};

/// Pin function requested from the helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Gpio,
    Pwm,
    Uart,
}

impl PinMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PinMode::Gpio => "gpio",
            PinMode::Pwm => "pwm",
            PinMode::Uart => "uart",
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switches a header pin to a peripheral function
pub trait PinMux: Send + Sync {
    /// Configure `pin` for `mode`
    ///
    /// # Errors
    /// Returns `HelperFailure` if the helper exits non-zero. This is a
    /// fail-fast condition: see [`DriverError::exit_code`].
    fn configure(&self, pin: &str, mode: PinMode) -> Result<()>;
}

/// Runs the `config-pin` program
#[derive(Debug, Clone)]
pub struct ConfigPin {
    program: String,
}

impl ConfigPin {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for ConfigPin {
    fn default() -> Self {
        Self::new("config-pin")
    }
}

impl PinMux for ConfigPin {
    fn configure(&self, pin: &str, mode: PinMode) -> Result<()> {
        debug!("{} {} {}", self.program, pin, mode);

        let status = Command::new(&self.program)
            .arg(pin)
            .arg(mode.as_str())
            .status()
            .map_err(|e| DriverError::HelperUnavailable {
                program: self.program.clone(),
                source: e,
            })?;

        if !status.success() {
            // Killed by a signal: no exit code, report a generic failure
            let code = status.code().unwrap_or(1);
            error!("{} {} {} exited with {}", self.program, pin, mode, code);
            return Err(DriverError::HelperFailure {
                pin: pin.to_string(),
                mode,
                code,
            });
        }

        Ok(())
    }
}
