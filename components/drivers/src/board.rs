//! Board context shared by all wrappers

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use bbio_chardev::TransientNode;
use log::info;

use crate::interrupt::{BitPool, BitPosition, BitmaskAllocator};
use crate::{BoardConfig, CharDevice, ConfigPin, DeviceRegistry, PinMux, Result, Sharing};

/// Everything a wrapper needs to reach the hardware
///
/// Device handles are resolved on first use, so a board that only drives
/// GPIOs never touches the PWM node. Handles injected with
/// [`Board::with_gpio_device`] / [`Board::with_pwm_device`] take precedence
/// over the configured paths.
pub struct Board {
    config: BoardConfig,
    gpio_device: Option<Arc<dyn CharDevice>>,
    pwm_device: Option<Arc<dyn CharDevice>>,
    pinmux: Arc<dyn PinMux>,
    bits: BitPool,
}

impl Board {
    /// Create a board from its configuration
    pub fn new(config: BoardConfig) -> Self {
        let pinmux = Arc::new(ConfigPin::new(config.pinmux.program.clone()));
        Self {
            config,
            gpio_device: None,
            pwm_device: None,
            pinmux,
            bits: Arc::new(Mutex::new(BitmaskAllocator::new())),
        }
    }

    /// Use `device` for every GPIO and interrupt wrapper
    pub fn with_gpio_device(mut self, device: Arc<dyn CharDevice>) -> Self {
        self.gpio_device = Some(device);
        self
    }

    /// Use `device` for every PWM wrapper
    pub fn with_pwm_device(mut self, device: Arc<dyn CharDevice>) -> Self {
        self.pwm_device = Some(device);
        self
    }

    /// Use `pinmux` instead of the configured helper program
    pub fn with_pinmux(mut self, pinmux: Arc<dyn PinMux>) -> Self {
        self.pinmux = pinmux;
        self
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn pinmux(&self) -> &dyn PinMux {
        self.pinmux.as_ref()
    }

    /// Handle to the GPIO device
    pub fn gpio_device(&self) -> Result<Arc<dyn CharDevice>> {
        self.device(self.gpio_device.as_ref(), &self.config.devices.gpio)
    }

    /// Handle to the PWM device
    pub fn pwm_device(&self) -> Result<Arc<dyn CharDevice>> {
        self.device(self.pwm_device.as_ref(), &self.config.devices.pwm)
    }

    fn device(&self, injected: Option<&Arc<dyn CharDevice>>, path: &Path) -> Result<Arc<dyn CharDevice>> {
        if let Some(device) = injected {
            return Ok(Arc::clone(device));
        }

        let device: Arc<dyn CharDevice> = match self.config.devices.sharing {
            Sharing::Shared => DeviceRegistry::global().open(path)?,
            Sharing::PerCall => Arc::new(TransientNode::new(path)),
        };
        Ok(device)
    }

    /// Reserve an interrupt bit position
    pub(crate) fn allocate_bit(&self) -> Result<BitPosition> {
        let bit = self
            .bits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate()?;
        Ok(bit)
    }

    /// Return an interrupt bit position
    pub(crate) fn release_bit(&self, bit: BitPosition) {
        self.bits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(bit);
    }

    /// Handle to the allocator, for wrappers that outlive the borrow
    pub(crate) fn bit_pool(&self) -> BitPool {
        Arc::clone(&self.bits)
    }

    /// Number of interrupt bit positions currently reserved
    pub fn interrupts_in_use(&self) -> u32 {
        self.bits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_use()
    }

    /// Close the process-wide device handles
    ///
    /// Wrappers created afterwards reopen the nodes.
    pub fn shutdown(&self) {
        if self.config.devices.sharing == Sharing::Shared {
            DeviceRegistry::global().shutdown();
        }
        info!("Board shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use bbio_chardev::mock::MockDevice;

    #[test]
    fn test_injected_device_wins() {
        let mock = Arc::new(MockDevice::new("/dev/bbgpio"));
        let board = Board::new(BoardConfig::default()).with_gpio_device(mock.clone());

        let device = board.gpio_device().unwrap();
        device.write(b"r 60").unwrap();
        assert_eq!(mock.commands(), vec!["r 60"]);
    }

    #[test]
    fn test_per_call_device_is_lazy() {
        let config = BoardConfig {
            devices: DeviceConfig {
                gpio: "/dev/definitely-not-bbgpio".into(),
                sharing: Sharing::PerCall,
                ..DeviceConfig::default()
            },
            ..BoardConfig::default()
        };
        let board = Board::new(config);

        // Resolving the handle succeeds; the node is only opened on use
        let device = board.gpio_device().unwrap();
        assert!(device.write(b"r 60").is_err());
    }

    #[test]
    fn test_shared_device_missing_node() {
        let config = BoardConfig {
            devices: DeviceConfig {
                pwm: "/dev/definitely-not-bbpwm".into(),
                ..DeviceConfig::default()
            },
            ..BoardConfig::default()
        };
        let board = Board::new(config);
        assert!(board.pwm_device().is_err());
    }

    #[test]
    fn test_bit_reservation() {
        let board = Board::new(BoardConfig::default());
        let bit = board.allocate_bit().unwrap();
        assert_eq!(board.interrupts_in_use(), 1);
        board.release_bit(bit);
        assert_eq!(board.interrupts_in_use(), 0);
    }
}
