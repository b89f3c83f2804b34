//! Pin command protocol
//!
//! The kernel modules parse each `write` with `sscanf("%c %u %u %u")`: a
//! one-letter opcode followed by space-separated decimal operands. There is
//! no framing beyond that, so every command must go out as a single write.
//!
//! | Device | Command | Response |
//! |--------|---------|----------|
//! | bbgpio | `i <gpio> <dir> <mask>` | - |
//! | bbgpio | `r <gpio>` | 4 bytes, `"0"` or `"1"` |
//! | bbgpio | `w <gpio> <0\|1>` | - |
//! | bbgpio | `f <gpio>` | - |
//! | bbpwm | `i <pwm>` | - |
//! | bbpwm | `r <pwm>` | 32 bytes, `"<duty_ns> <period_ns>"` |
//! | bbpwm | `w <pwm> <duty_ns> <period_ns>` | - |
//! | bbpwm | `f <pwm>` | - |

use std::fmt;

use log::debug;

use crate::{CharDevice, DriverError, Result};

/// Response size of a GPIO read
pub const GPIO_RESPONSE_LEN: usize = 4;

/// Response size of a PWM read
pub const PWM_RESPONSE_LEN: usize = 32;

/// Command opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Init,
    Read,
    Write,
    Free,
}

impl Opcode {
    /// Wire mnemonic
    pub const fn mnemonic(self) -> char {
        match self {
            Opcode::Init => 'i',
            Opcode::Read => 'r',
            Opcode::Write => 'w',
            Opcode::Free => 'f',
        }
    }
}

/// GPIO direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input = 0,
    Output = 1,
}

/// Logical GPIO level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    #[default]
    Low = 0,
    High = 1,
}

impl Level {
    /// The opposite level
    pub fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// PWM timing in nanoseconds
///
/// The driver stores both values as `unsigned int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PwmTiming {
    pub duty_ns: u32,
    pub period_ns: u32,
}

/// A driver command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GpioInit { id: u32, direction: Direction, mask: u32 },
    GpioRead { id: u32 },
    GpioWrite { id: u32, level: Level },
    GpioFree { id: u32 },
    PwmInit { id: u32 },
    PwmRead { id: u32 },
    PwmWrite { id: u32, timing: PwmTiming },
    PwmFree { id: u32 },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::GpioInit { .. } | Command::PwmInit { .. } => Opcode::Init,
            Command::GpioRead { .. } | Command::PwmRead { .. } => Opcode::Read,
            Command::GpioWrite { .. } | Command::PwmWrite { .. } => Opcode::Write,
            Command::GpioFree { .. } | Command::PwmFree { .. } => Opcode::Free,
        }
    }

    /// Encode as the ASCII line the driver parses
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Write the command to `device`
    pub fn send(&self, device: &dyn CharDevice) -> Result<()> {
        let line = self.encode();
        debug!("{} <- {}", device.path().display(), line);
        device.write(line.as_bytes())?;
        Ok(())
    }

    /// Write the command and read up to `len` response bytes
    pub fn query(&self, device: &dyn CharDevice, len: usize) -> Result<Vec<u8>> {
        let line = self.encode();
        debug!("{} <- {}", device.path().display(), line);
        let response = device.transact(line.as_bytes(), len)?;
        debug!("{} -> {:?}", device.path().display(), String::from_utf8_lossy(&response));
        Ok(response)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode().mnemonic();
        match *self {
            Command::GpioInit { id, direction, mask } => {
                write!(f, "{op} {id} {} {mask}", direction as u8)
            }
            Command::GpioWrite { id, level } => write!(f, "{op} {id} {level}"),
            Command::PwmWrite { id, timing } => {
                write!(f, "{op} {id} {} {}", timing.duty_ns, timing.period_ns)
            }
            Command::GpioRead { id }
            | Command::GpioFree { id }
            | Command::PwmInit { id }
            | Command::PwmRead { id }
            | Command::PwmFree { id } => write!(f, "{op} {id}"),
        }
    }
}

/// Response text with the driver's NUL padding and line ending removed
pub fn response_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Interpret a GPIO read response
///
/// Only `"0"` and `"1"` are levels; anything else yields `None`.
pub fn parse_level(bytes: &[u8]) -> Option<Level> {
    match response_text(bytes).as_str() {
        "0" => Some(Level::Low),
        "1" => Some(Level::High),
        _ => None,
    }
}

/// Interpret a PWM read response
pub fn parse_pwm_timing(device: &dyn CharDevice, bytes: &[u8]) -> Result<PwmTiming> {
    let text = response_text(bytes);
    let malformed = || DriverError::MalformedResponse {
        device: device.path().to_path_buf(),
        response: text.clone(),
    };

    let mut fields = text.split_whitespace();
    let duty_ns = fields.next().and_then(|f| f.parse().ok()).ok_or_else(malformed)?;
    let period_ns = fields.next().and_then(|f| f.parse().ok()).ok_or_else(malformed)?;
    if fields.next().is_some() {
        return Err(malformed());
    }

    Ok(PwmTiming { duty_ns, period_ns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbio_chardev::mock::MockDevice;

    #[test]
    fn test_gpio_commands() {
        let init = Command::GpioInit {
            id: 60,
            direction: Direction::Input,
            mask: 4,
        };
        assert_eq!(init.encode(), "i 60 0 4");
        assert_eq!(Command::GpioRead { id: 60 }.encode(), "r 60");
        assert_eq!(
            Command::GpioWrite { id: 22, level: Level::High }.encode(),
            "w 22 1"
        );
        assert_eq!(Command::GpioFree { id: 22 }.encode(), "f 22");
    }

    #[test]
    fn test_pwm_commands() {
        let timing = PwmTiming {
            duty_ns: 500_000,
            period_ns: 1_000_000,
        };
        assert_eq!(Command::PwmInit { id: 3 }.encode(), "i 3");
        assert_eq!(
            Command::PwmWrite { id: 3, timing }.encode(),
            "w 3 500000 1000000"
        );
        assert_eq!(Command::PwmFree { id: 3 }.encode(), "f 3");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(b"0\0\0\0"), Some(Level::Low));
        assert_eq!(parse_level(b"1"), Some(Level::High));
        assert_eq!(parse_level(b"1\n"), Some(Level::High));
        assert_eq!(parse_level(b""), None);
        assert_eq!(parse_level(b"7"), None);
        assert_eq!(parse_level(b"10"), None);
    }

    #[test]
    fn test_parse_pwm_timing() {
        let device = MockDevice::new("/dev/bbpwm");
        let timing = parse_pwm_timing(&device, b"500000 1000000\0\0").unwrap();
        assert_eq!(timing.duty_ns, 500_000);
        assert_eq!(timing.period_ns, 1_000_000);

        let result = parse_pwm_timing(&device, b"garbage");
        assert!(matches!(result, Err(DriverError::MalformedResponse { .. })));
    }

    #[test]
    fn test_level_toggle() {
        assert_eq!(Level::Low.toggled(), Level::High);
        assert_eq!(Level::High.toggled().toggled(), Level::High);
        assert_eq!(Level::from(true), Level::High);
    }
}
