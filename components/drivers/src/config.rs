//! Board configuration
//!
//! Loaded from TOML. Every section and key is optional; missing values fall
//! back to the stock BeagleBone Black image layout.
//!
//! ```toml
//! [devices]
//! gpio = "/dev/bbgpio"
//! pwm = "/dev/bbpwm"
//! sharing = "shared"        # or "per-call"
//!
//! [sysfs]
//! root = "/sys"
//!
//! [pinmux]
//! program = "config-pin"
//!
//! [serial]
//! prefix = "/dev/ttyO"
//! timeout_ms = 1000
//!
//! [interrupts]
//! delivery = "poll"         # or "signal"
//! poll_timeout_ms = 100     # 0 blocks forever
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::{DriverError, Result};

/// How wrappers reach a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sharing {
    /// One descriptor per device class, held for the whole process
    #[default]
    Shared,
    /// Open and close the node around every operation
    PerCall,
}

/// How interrupt edges reach user callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    /// A worker thread per interrupt blocks in `poll` on the GPIO device
    #[default]
    Poll,
    /// The driver sends `SIGIO`; one process-wide handler dispatches by source id
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub gpio: PathBuf,
    pub pwm: PathBuf,
    pub sharing: Sharing,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gpio: PathBuf::from("/dev/bbgpio"),
            pwm: PathBuf::from("/dev/bbpwm"),
            sharing: Sharing::Shared,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SysfsConfig {
    pub root: PathBuf,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/sys"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinMuxConfig {
    pub program: String,
}

impl Default for PinMuxConfig {
    fn default() -> Self {
        Self {
            program: "config-pin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub prefix: String,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            prefix: "/dev/ttyO".to_string(),
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterruptConfig {
    pub delivery: Delivery,
    pub poll_timeout_ms: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            delivery: Delivery::Poll,
            poll_timeout_ms: 100,
        }
    }
}

impl InterruptConfig {
    /// Poll timeout for interrupt workers, `None` blocks forever
    pub fn poll_timeout(&self) -> Option<Duration> {
        match self.poll_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Complete board configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    pub devices: DeviceConfig,
    pub sysfs: SysfsConfig,
    pub pinmux: PinMuxConfig,
    pub serial: SerialConfig,
    pub interrupts: InterruptConfig,
}

impl BoardConfig {
    /// Environment variable naming a configuration file
    pub const ENV_VAR: &'static str = "BBIO_CONFIG";

    /// Configuration file looked up in the working directory
    pub const DEFAULT_PATH: &'static str = ".bbio/config.toml";

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)?;
        info!("Loaded board configuration from {}", path.display());
        Ok(config)
    }

    /// Find and load the configuration
    ///
    /// Lookup order: `explicit`, then `$BBIO_CONFIG`, then
    /// `.bbio/config.toml`, then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = env::var_os(Self::ENV_VAR) {
            return Self::load(PathBuf::from(path));
        }

        let local = Path::new(Self::DEFAULT_PATH);
        if local.is_file() {
            return Self::load(local);
        }

        Ok(Self::default())
    }
}
