//! GPIO wrapper

use std::sync::Arc;

use log::{info, warn};

use crate::protocol::{self, GPIO_RESPONSE_LEN};
use crate::{Board, CharDevice, Command, Direction, DriverError, Level, Pin, Result};

/// A header pin driven through the bbgpio device
///
/// The level is cached client-side after every read and write. Writes update
/// the cache without reading back from the hardware.
pub struct Gpio {
    pin: Pin,
    direction: Direction,
    mask: u32,
    state: Level,
    device: Arc<dyn CharDevice>,
}

impl Gpio {
    /// Claim `pin` from the driver and set its direction
    ///
    /// # Errors
    /// Returns `UnknownPin` before any device is contacted if `pin` is not on
    /// the header.
    pub fn init(board: &Board, pin: &str, direction: Direction) -> Result<Self> {
        let pin = Pin::lookup(pin)?;
        Self::init_pin(board, pin, direction, 0)
    }

    /// Claim an already resolved pin, tagging it with an interrupt mask
    pub(crate) fn init_pin(board: &Board, pin: Pin, direction: Direction, mask: u32) -> Result<Self> {
        let device = board.gpio_device()?;
        Command::GpioInit {
            id: pin.gpio_id(),
            direction,
            mask,
        }
        .send(device.as_ref())?;

        info!("GPIO {} (line {}) initialised as {:?}", pin, pin.gpio_id(), direction);
        Ok(Self {
            pin,
            direction,
            mask,
            state: Level::Low,
            device,
        })
    }

    fn query_level(&self) -> Result<(Option<Level>, Vec<u8>)> {
        let response = Command::GpioRead {
            id: self.pin.gpio_id(),
        }
        .query(self.device.as_ref(), GPIO_RESPONSE_LEN)?;
        Ok((protocol::parse_level(&response), response))
    }

    /// Read the pin level
    ///
    /// A response other than `"0"` or `"1"` is logged and leaves the cached
    /// level unchanged; the cached level is returned. Use
    /// [`Gpio::read_strict`] to treat it as an error instead.
    pub fn read(&mut self) -> Result<Level> {
        let (level, response) = self.query_level()?;
        match level {
            Some(level) => self.state = level,
            None => warn!(
                "GPIO {}: ignoring unexpected read response {:?}",
                self.pin,
                protocol::response_text(&response)
            ),
        }
        Ok(self.state)
    }

    /// Read the pin level, failing on an unexpected response
    ///
    /// # Errors
    /// Returns `MalformedResponse` and leaves the cached level unchanged
    pub fn read_strict(&mut self) -> Result<Level> {
        let (level, response) = self.query_level()?;
        let level = level.ok_or_else(|| DriverError::MalformedResponse {
            device: self.device.path().to_path_buf(),
            response: protocol::response_text(&response),
        })?;
        self.state = level;
        Ok(level)
    }

    /// Drive the pin to `level`
    pub fn write(&mut self, level: Level) -> Result<()> {
        Command::GpioWrite {
            id: self.pin.gpio_id(),
            level,
        }
        .send(self.device.as_ref())?;
        self.state = level;
        Ok(())
    }

    /// Drive the pin to the opposite of the cached level
    pub fn toggle(&mut self) -> Result<Level> {
        let level = self.state.toggled();
        self.write(level)?;
        Ok(level)
    }

    /// Last level read from or written to the pin
    pub fn state(&self) -> Level {
        self.state
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Interrupt mask the pin was initialised with (0 for plain GPIOs)
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub(crate) fn device(&self) -> &Arc<dyn CharDevice> {
        &self.device
    }

    pub(crate) fn send_free(&self) -> Result<()> {
        Command::GpioFree {
            id: self.pin.gpio_id(),
        }
        .send(self.device.as_ref())?;
        info!("GPIO {} freed", self.pin);
        Ok(())
    }

    /// Release the pin back to the driver
    pub fn free(self) -> Result<()> {
        self.send_free()
    }
}
