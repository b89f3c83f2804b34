//! Interrupt wrapper
//!
//! # Purpose
//! An interrupt is an input GPIO whose edges are delivered to a user callback.
//! The bbgpio driver tags each interrupt source with one bit of the poll
//! event mask, so the number of sources on a board is bounded by the
//! [`BitmaskAllocator`].
//!
//! # Architecture
//! Two delivery strategies share one wrapper:
//! - [`Delivery::Poll`]: a worker thread named `irq-<pin>` blocks in `poll`
//!   on the GPIO device and calls the callback for every wake-up carrying
//!   the source's bit.
//! - [`Delivery::Signal`]: the driver queues `SIGIO` carrying the GPIO line
//!   as source id; the process-wide [`SignalDispatcher`] routes it to the
//!   callback. A line can be attached by one interrupt at a time, whichever
//!   board created it.
//!
//! ```text
//! Detached --attach--> Attached --detach--> Detached
//!     \                    |
//!      `------free---------'--> GPIO freed, bit returned
//! ```

mod allocator;
mod poller;
mod signal;

use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{info, warn};

use crate::{Board, Delivery, Direction, DriverError, Gpio, Level, Pin, Result};
use poller::PollWorker;

pub use allocator::{BitPosition, BitmaskAllocator, BitmaskExhausted};
pub use signal::{SignalDispatcher, MAX_SOURCES};

/// User callback for an interrupt edge
///
/// Arguments are captured by the closure.
pub type Callback = Box<dyn FnMut() + Send + 'static>;

/// Allocator shared between a board and the interrupts created from it
pub(crate) type BitPool = Arc<Mutex<BitmaskAllocator>>;

/// Whether a callback is currently registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    Detached,
    Attached,
}

enum Registration {
    Detached,
    Polling(PollWorker),
    Signal { id: u32 },
}

/// An input pin delivering edges to a callback
pub struct Interrupt {
    gpio: Gpio,
    bit: BitPosition,
    pool: BitPool,
    delivery: Delivery,
    poll_timeout: Option<Duration>,
    registration: Registration,
}

impl Interrupt {
    /// Claim `pin` as an interrupt source using the board's configured delivery
    ///
    /// # Errors
    /// - `UnknownPin` before a bit is reserved or a device contacted
    /// - `BitmaskExhausted` if every bit position is taken
    pub fn init(board: &Board, pin: &str) -> Result<Self> {
        Self::init_with(board, pin, board.config().interrupts.delivery)
    }

    /// Claim `pin` as an interrupt source with an explicit delivery strategy
    pub fn init_with(board: &Board, pin: &str, delivery: Delivery) -> Result<Self> {
        let pin = Pin::lookup(pin)?;
        let bit = board.allocate_bit()?;

        // The signal driver takes the process to notify in place of a mask
        let mask = match delivery {
            Delivery::Poll => bit.mask(),
            Delivery::Signal => std::process::id(),
        };

        let gpio = match Gpio::init_pin(board, pin, Direction::Input, mask) {
            Ok(gpio) => gpio,
            Err(e) => {
                board.release_bit(bit);
                return Err(e);
            }
        };

        info!("Interrupt {} uses bit {} ({:?})", pin, bit.index(), delivery);
        Ok(Self {
            gpio,
            bit,
            pool: board.bit_pool(),
            delivery,
            poll_timeout: board.config().interrupts.poll_timeout(),
            registration: Registration::Detached,
        })
    }

    /// Register `callback` for every edge on the pin
    ///
    /// # Errors
    /// - `AlreadyAttached` if a callback is registered; detach first. With
    ///   signal delivery this also covers another interrupt holding the same
    ///   GPIO line.
    /// - `Spawn` if the worker thread or signal dispatcher cannot start
    pub fn attach<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_attached() {
            return Err(DriverError::AlreadyAttached {
                pin: self.gpio.pin().key(),
            });
        }

        let callback: Callback = Box::new(callback);
        self.registration = match self.delivery {
            Delivery::Poll => Registration::Polling(PollWorker::spawn(
                format!("irq-{}", self.gpio.pin().key()),
                Arc::clone(self.gpio.device()),
                self.bit.events(),
                self.poll_timeout,
                callback,
            )?),
            Delivery::Signal => {
                let pin = self.gpio.pin();
                let id = pin.gpio_id();
                SignalDispatcher::global().register(id, pin.key(), callback)?;
                Registration::Signal { id }
            }
        };

        info!("Interrupt {} attached", self.gpio.pin());
        Ok(())
    }

    /// Stop delivering edges
    ///
    /// With a finite poll timeout this waits for the worker to exit; without
    /// one the worker exits after its next wake-up and never calls back.
    pub fn detach(&mut self) {
        match mem::replace(&mut self.registration, Registration::Detached) {
            Registration::Detached => return,
            Registration::Polling(mut worker) => worker.stop(),
            Registration::Signal { id } => {
                if !SignalDispatcher::global().unregister(id) {
                    warn!("Interrupt {}: source {} was not registered", self.gpio.pin(), id);
                }
            }
        }
        info!("Interrupt {} detached", self.gpio.pin());
    }

    pub fn is_attached(&self) -> bool {
        !matches!(self.registration, Registration::Detached)
    }

    pub fn state(&self) -> InterruptState {
        if self.is_attached() {
            InterruptState::Attached
        } else {
            InterruptState::Detached
        }
    }

    /// Whether the polling worker is still alive (always `false` for signals)
    pub fn is_polling(&self) -> bool {
        match &self.registration {
            Registration::Polling(worker) => worker.is_running(),
            _ => false,
        }
    }

    /// Read the current pin level
    pub fn read(&mut self) -> Result<Level> {
        self.gpio.read()
    }

    pub fn gpio(&self) -> &Gpio {
        &self.gpio
    }

    pub fn bit(&self) -> BitPosition {
        self.bit
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Detach, release the pin back to the driver and return the bit
    pub fn free(mut self) -> Result<()> {
        self.detach();
        self.gpio.send_free()
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.detach();
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(self.bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoardConfig, EventMask};
    use bbio_chardev::mock::MockDevice;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn board() -> (Board, Arc<MockDevice>) {
        let mock = Arc::new(MockDevice::new("/dev/bbgpio"));
        let board = Board::new(BoardConfig::default()).with_gpio_device(mock.clone());
        (board, mock)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_init_sends_bit_mask() {
        let (board, mock) = board();
        let first = Interrupt::init(&board, "P8_19").unwrap();
        let second = Interrupt::init(&board, "P9_12").unwrap();

        assert_eq!(mock.commands(), vec!["i 22 0 1", "i 60 0 2"]);
        assert_eq!(first.bit().index(), 0);
        assert_eq!(second.bit().index(), 1);
        assert_eq!(board.interrupts_in_use(), 2);
    }

    #[test]
    fn test_unknown_pin_reserves_nothing() {
        let (board, mock) = board();
        let result = Interrupt::init(&board, "P8_0");

        assert!(matches!(result, Err(DriverError::UnknownPin { .. })));
        assert_eq!(board.interrupts_in_use(), 0);
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_callbacks_match_edges() {
        let (board, mock) = board();
        let mut irq = Interrupt::init(&board, "P8_19").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let wrong_thread = Arc::new(AtomicBool::new(false));

        {
            let count = Arc::clone(&count);
            let busy = Arc::clone(&busy);
            let overlapped = Arc::clone(&overlapped);
            let wrong_thread = Arc::clone(&wrong_thread);
            irq.attach(move || {
                if busy.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                if thread::current().name() != Some("irq-P8_19") {
                    wrong_thread.store(true, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(1));
                count.fetch_add(1, Ordering::SeqCst);
                busy.store(false, Ordering::SeqCst);
            })
            .unwrap();
        }

        for _ in 0..5 {
            mock.signal(irq.bit().events());
        }

        assert!(wait_for(|| count.load(Ordering::SeqCst) == 5));
        // Wake-ups for other sources are ignored
        mock.signal(EventMask::from_bits_retain(1 << 7));
        thread::sleep(Duration::from_millis(50));

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!overlapped.load(Ordering::SeqCst));
        assert!(!wrong_thread.load(Ordering::SeqCst));
        irq.free().unwrap();
    }

    #[test]
    fn test_attach_twice_fails() {
        let (board, _mock) = board();
        let mut irq = Interrupt::init(&board, "P8_19").unwrap();

        irq.attach(|| {}).unwrap();
        let result = irq.attach(|| {});
        assert!(matches!(
            result,
            Err(DriverError::AlreadyAttached { pin: "P8_19" })
        ));
        assert_eq!(irq.state(), InterruptState::Attached);
    }

    #[test]
    fn test_detach_then_reattach() {
        let (board, _mock) = board();
        let mut irq = Interrupt::init(&board, "P8_19").unwrap();

        irq.attach(|| {}).unwrap();
        assert!(irq.is_polling());
        irq.detach();
        assert_eq!(irq.state(), InterruptState::Detached);
        assert!(!irq.is_polling());

        irq.attach(|| {}).unwrap();
        assert!(irq.is_attached());
    }

    #[test]
    fn test_free_returns_pin_and_bit() {
        let (board, mock) = board();
        let mut irq = Interrupt::init(&board, "P8_19").unwrap();
        irq.attach(|| {}).unwrap();
        irq.free().unwrap();

        assert_eq!(mock.last_command().as_deref(), Some("f 22"));
        assert_eq!(board.interrupts_in_use(), 0);

        // The same pin can be claimed and attached again
        let mut again = Interrupt::init(&board, "P8_19").unwrap();
        assert_eq!(again.bit().index(), 0);
        again.attach(|| {}).unwrap();
    }

    #[test]
    fn test_no_callback_after_detach() {
        let (board, mock) = board();
        let mut irq = Interrupt::init(&board, "P8_19").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        irq.attach(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        irq.detach();

        mock.signal(irq.bit().events());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_line_is_a_valid_signal_source() {
        assert!(Pin::all().all(|pin| pin.gpio_id() < MAX_SOURCES));
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let (board, _mock) = board();
        let pins: Vec<&str> = Pin::all().map(|p| p.key()).take(14).collect();

        let mut held = Vec::new();
        for pin in &pins[..13] {
            held.push(Interrupt::init(&board, pin).unwrap());
        }

        let result = Interrupt::init(&board, pins[13]);
        assert!(matches!(result, Err(DriverError::BitmaskExhausted(_))));

        held.pop();
        assert!(Interrupt::init(&board, pins[13]).is_ok());
    }
}
