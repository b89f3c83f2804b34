//! BeagleBone Black header pin table
//!
//! Maps the P8/P9 header keys to the SoC functions the drivers use: the GPIO
//! line number, the eHRPWM channel, and the UART TX/RX pairs.

use std::fmt;

use crate::{DriverError, Result};

/// eHRPWM channel location in sysfs
///
/// `chip` and `addr` are the epwmss and pwm block addresses that name the
/// sysfs directories; `index` selects output A (0) or B (1) of the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PwmChannel {
    pub chip: &'static str,
    pub addr: &'static str,
    pub index: u32,
}

const EHRPWM0_A: PwmChannel = PwmChannel { chip: "48300000", addr: "48300200", index: 0 };
const EHRPWM0_B: PwmChannel = PwmChannel { chip: "48300000", addr: "48300200", index: 1 };
const EHRPWM1_A: PwmChannel = PwmChannel { chip: "48302000", addr: "48302200", index: 0 };
const EHRPWM1_B: PwmChannel = PwmChannel { chip: "48302000", addr: "48302200", index: 1 };
const EHRPWM2_A: PwmChannel = PwmChannel { chip: "48304000", addr: "48304200", index: 0 };
const EHRPWM2_B: PwmChannel = PwmChannel { chip: "48304000", addr: "48304200", index: 1 };

/// A header pin and the peripheral identifiers it maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin {
    key: &'static str,
    gpio: u32,
    pwm: Option<PwmChannel>,
}

impl Pin {
    const fn gpio(key: &'static str, gpio: u32) -> Self {
        Self { key, gpio, pwm: None }
    }

    const fn pwm(key: &'static str, gpio: u32, channel: PwmChannel) -> Self {
        Self {
            key,
            gpio,
            pwm: Some(channel),
        }
    }

    /// Resolve a header key such as `P9_12` (case-insensitive)
    ///
    /// # Errors
    /// Returns `UnknownPin` if the key is not on the header
    pub fn lookup(name: &str) -> Result<Pin> {
        PINS.iter()
            .find(|pin| pin.key.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| DriverError::UnknownPin {
                name: name.to_string(),
            })
    }

    /// Every pin in the table, P8 first
    pub fn all() -> impl Iterator<Item = Pin> {
        PINS.iter().copied()
    }

    /// Header key, e.g. `P9_12`
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// GPIO line number
    pub fn gpio_id(&self) -> u32 {
        self.gpio
    }

    /// eHRPWM channel, if the pin has one
    pub fn pwm_channel(&self) -> Option<PwmChannel> {
        self.pwm
    }

    /// eHRPWM channel, or `NotCapable`
    pub fn require_pwm(&self) -> Result<PwmChannel> {
        self.pwm.ok_or(DriverError::NotCapable {
            pin: self.key,
            function: "pwm",
        })
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key)
    }
}

static PINS: &[Pin] = &[
    Pin::gpio("P8_3", 38),
    Pin::gpio("P8_4", 39),
    Pin::gpio("P8_5", 34),
    Pin::gpio("P8_6", 35),
    Pin::gpio("P8_7", 66),
    Pin::gpio("P8_8", 67),
    Pin::gpio("P8_9", 69),
    Pin::gpio("P8_10", 68),
    Pin::gpio("P8_11", 45),
    Pin::gpio("P8_12", 44),
    Pin::pwm("P8_13", 23, EHRPWM2_B),
    Pin::gpio("P8_14", 26),
    Pin::gpio("P8_15", 47),
    Pin::gpio("P8_16", 46),
    Pin::gpio("P8_17", 27),
    Pin::gpio("P8_18", 65),
    Pin::pwm("P8_19", 22, EHRPWM2_A),
    Pin::gpio("P8_20", 63),
    Pin::gpio("P8_21", 62),
    Pin::gpio("P8_22", 37),
    Pin::gpio("P8_23", 36),
    Pin::gpio("P8_24", 33),
    Pin::gpio("P8_25", 32),
    Pin::gpio("P8_26", 61),
    Pin::gpio("P8_27", 86),
    Pin::gpio("P8_28", 88),
    Pin::gpio("P8_29", 87),
    Pin::gpio("P8_30", 89),
    Pin::gpio("P8_31", 10),
    Pin::gpio("P8_32", 11),
    Pin::gpio("P8_33", 9),
    Pin::pwm("P8_34", 81, EHRPWM1_B),
    Pin::gpio("P8_35", 8),
    Pin::pwm("P8_36", 80, EHRPWM1_A),
    Pin::gpio("P8_37", 78),
    Pin::gpio("P8_38", 79),
    Pin::gpio("P8_39", 76),
    Pin::gpio("P8_40", 77),
    Pin::gpio("P8_41", 74),
    Pin::gpio("P8_42", 75),
    Pin::gpio("P8_43", 72),
    Pin::gpio("P8_44", 73),
    Pin::pwm("P8_45", 70, EHRPWM2_A),
    Pin::pwm("P8_46", 71, EHRPWM2_B),
    Pin::gpio("P9_11", 30),
    Pin::gpio("P9_12", 60),
    Pin::gpio("P9_13", 31),
    Pin::pwm("P9_14", 50, EHRPWM1_A),
    Pin::gpio("P9_15", 48),
    Pin::pwm("P9_16", 51, EHRPWM1_B),
    Pin::gpio("P9_17", 5),
    Pin::gpio("P9_18", 4),
    Pin::gpio("P9_19", 13),
    Pin::gpio("P9_20", 12),
    Pin::pwm("P9_21", 3, EHRPWM0_B),
    Pin::pwm("P9_22", 2, EHRPWM0_A),
    Pin::gpio("P9_23", 49),
    Pin::gpio("P9_24", 15),
    Pin::gpio("P9_25", 117),
    Pin::gpio("P9_26", 14),
    Pin::gpio("P9_27", 115),
    Pin::gpio("P9_28", 113),
    Pin::pwm("P9_29", 111, EHRPWM0_B),
    Pin::gpio("P9_30", 112),
    Pin::pwm("P9_31", 110, EHRPWM0_A),
    Pin::gpio("P9_41", 20),
    Pin::gpio("P9_42", 7),
];

/// TX/RX header keys of a UART instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UartPins {
    pub name: &'static str,
    pub tx: &'static str,
    pub rx: &'static str,
}

static UARTS: &[UartPins] = &[
    UartPins { name: "UART1", tx: "P9_24", rx: "P9_26" },
    UartPins { name: "UART2", tx: "P9_21", rx: "P9_22" },
    UartPins { name: "UART4", tx: "P9_13", rx: "P9_11" },
    UartPins { name: "UART5", tx: "P8_37", rx: "P8_38" },
];

impl UartPins {
    /// Resolve a UART instance such as `UART1` (case-insensitive)
    pub fn lookup(name: &str) -> Result<UartPins> {
        UARTS
            .iter()
            .find(|uart| uart.name.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| DriverError::UnknownUart {
                name: name.to_string(),
            })
    }

    /// Every UART instance routed to the header
    pub fn all() -> impl Iterator<Item = UartPins> {
        UARTS.iter().copied()
    }

    /// Serial device node for this instance, e.g. `/dev/ttyO1`
    pub fn device_path(&self, prefix: &str) -> String {
        let index = &self.name[self.name.len() - 1..];
        format!("{prefix}{index}")
    }
}
