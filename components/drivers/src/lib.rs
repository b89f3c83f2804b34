//! BeagleBone Black Peripheral Drivers - GPIO, PWM, interrupts and UART
//!
//! # Purpose
//! Thin, typed wrappers over the bbgpio and bbpwm character devices and the
//! SoC's UART ports. Each wrapper resolves a header pin name such as `P9_12`
//! through a static pin table, formats a short command for the driver and
//! tracks the little client-side state the hardware does not report back.
//!
//! # Integration Points
//! - Depends on: bbio-chardev (device nodes), `config-pin` (pin muxing),
//!   sysfs (PWM chip enumeration), serialport (UART)
//! - Provides to: bbio-esp8266, the `bbio` command-line tool
//!
//! # Architecture
//! A [`Board`] carries the configuration, the device handles for each
//! peripheral class, the pin-mux helper and the interrupt bit allocator.
//! Wrappers borrow the board only while they are being initialised and keep
//! their own `Arc` to the device afterwards.
//!
//! ```no_run
//! use bbio_drivers::{Board, BoardConfig, Direction, Gpio, Level};
//!
//! # fn main() -> bbio_drivers::Result<()> {
//! let board = Board::new(BoardConfig::default());
//! let mut led = Gpio::init(&board, "P8_19", Direction::Output)?;
//! led.write(Level::High)?;
//! led.free()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing Strategy
//! - Unit tests: pin table, command encoding, PWM timing math, bit allocation
//! - Integration tests: wrappers against `bbio_chardev::mock::MockDevice`,
//!   polling and signal interrupt delivery

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use bbio_chardev::{CharDevice, DeviceError, DeviceRegistry, EventMask};

mod board;
pub mod config;
mod gpio;
pub mod interrupt;
pub mod pinmux;
pub mod pins;
pub mod protocol;
mod pwm;
mod uart;

pub use board::Board;
pub use config::{BoardConfig, Delivery, Sharing};
pub use gpio::Gpio;
pub use interrupt::{BitPosition, BitmaskAllocator, BitmaskExhausted, Interrupt, InterruptState};
pub use pinmux::{ConfigPin, PinMode, PinMux};
pub use pins::{Pin, PwmChannel, UartPins};
pub use protocol::{Command, Direction, Level, PwmTiming};
pub use pwm::{chip_directory, resolve_pwm_id, Pwm};
pub use uart::{SerialIo, Uart};

/// Driver error types
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Unknown pin: {name}")]
    UnknownPin { name: String },

    #[error("Pin {pin} has no {function} function")]
    NotCapable {
        pin: &'static str,
        function: &'static str,
    },

    #[error("Unknown UART: {name}")]
    UnknownUart { name: String },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("No pwmchip entry under {path}")]
    PwmChipNotFound { path: PathBuf },

    #[error("Pin-mux helper failed for {pin} ({mode}) with exit code {code}")]
    HelperFailure { pin: String, mode: PinMode, code: i32 },

    #[error("Pin-mux helper {program} could not be run: {source}")]
    HelperUnavailable { program: String, source: io::Error },

    #[error("Malformed response from {device}: {response:?}")]
    MalformedResponse { device: PathBuf, response: String },

    #[error(transparent)]
    BitmaskExhausted(#[from] BitmaskExhausted),

    #[error("Interrupt on {pin} already attached")]
    AlreadyAttached { pin: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serial port {path}: {source}")]
    Serial {
        path: String,
        source: serialport::Error,
    },

    #[error("Serial I/O on {path}: {source}")]
    SerialIo { path: String, source: io::Error },

    #[error("Failed to start {name}: {source}")]
    Spawn { name: String, source: io::Error },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DriverError {
    /// Process exit code for fail-fast errors
    ///
    /// A failing pin-mux helper leaves the pin in an unknown function, and
    /// callers are expected to terminate with the helper's own exit code.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            DriverError::HelperFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = core::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_only_for_helper_failure() {
        let helper = DriverError::HelperFailure {
            pin: "P9_14".into(),
            mode: PinMode::Pwm,
            code: 3,
        };
        assert_eq!(helper.exit_code(), Some(3));

        let unknown = DriverError::UnknownPin {
            name: "P10_1".into(),
        };
        assert_eq!(unknown.exit_code(), None);
    }
}
