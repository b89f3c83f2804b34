//! AT command transport and retry loop

use std::thread;
use std::time::Duration;

use bbio_drivers::{SerialIo, Uart};
use log::{debug, info, warn};

use crate::{AtError, Result};

/// Lines the firmware sends when a command succeeded
pub const SUCCESS_TOKENS: &[&str] = &["OK", "ready", "no change", "SEND OK", "CONNECT"];

/// Lines the firmware sends when a command failed
pub const ERROR_TOKENS: &[&str] = &["ERROR", "Fail"];

/// Classification of one response line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtStatus {
    Success,
    Failure,
    /// Echo, progress output or nothing yet
    Pending,
}

impl AtStatus {
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if SUCCESS_TOKENS.contains(&line) {
            AtStatus::Success
        } else if ERROR_TOKENS.contains(&line) {
            AtStatus::Failure
        } else {
            AtStatus::Pending
        }
    }

    pub fn is_final(self) -> bool {
        self != AtStatus::Pending
    }
}

/// Line transport to the module
pub trait AtLink {
    /// Send one command line
    fn write_line(&mut self, line: &str) -> bbio_drivers::Result<()>;

    /// Receive one line without its terminator
    fn read_line(&mut self) -> bbio_drivers::Result<String>;

    /// Whether received data is waiting
    fn is_busy(&self) -> bbio_drivers::Result<bool>;
}

impl<P: SerialIo> AtLink for Uart<P> {
    fn write_line(&mut self, line: &str) -> bbio_drivers::Result<()> {
        self.write(line)
    }

    fn read_line(&mut self) -> bbio_drivers::Result<String> {
        self.read()
    }

    fn is_busy(&self) -> bbio_drivers::Result<bool> {
        Uart::<P>::is_busy(self)
    }
}

/// Delays used while talking to the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtTiming {
    /// Pause after the first response line of an attempt
    pub settle: Duration,
    /// Interval between checks for more output; `wait` counts these
    pub poll_interval: Duration,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Extra polls granted while the module reports `busy`
    pub busy_limit: u32,
    /// Pause between the parts of a `CIPSEND` exchange
    pub send_settle: Duration,
    /// Interval between checks for `SEND OK`
    pub send_poll: Duration,
    /// Number of checks for `SEND OK`
    pub send_polls: u32,
}

impl Default for AtTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(200),
            poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            busy_limit: 10,
            send_settle: Duration::from_millis(300),
            send_poll: Duration::from_millis(100),
            send_polls: 100,
        }
    }
}

impl AtTiming {
    /// No delays at all, for scripted links
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            poll_interval: Duration::ZERO,
            retry_delay: Duration::ZERO,
            send_settle: Duration::ZERO,
            send_poll: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Send `command` until the module answers with a success token
///
/// Each attempt writes the command once, then keeps reading for up to
/// `wait` poll intervals (plus up to `busy_limit` more while the module
/// says it is busy). An error token ends the attempt early.
///
/// # Arguments
/// * `wait` - poll intervals to wait per attempt
/// * `retries` - maximum number of times the command is written
///
/// # Returns
/// The success line
///
/// # Errors
/// - `RetriesExhausted` once `retries` attempts have failed
/// - `Link` if the transport fails
pub fn send_cmd<L: AtLink + ?Sized>(
    link: &mut L,
    command: &str,
    wait: u32,
    retries: u32,
    timing: &AtTiming,
) -> Result<String> {
    info!("Sending command: {}", command);
    let mut status = String::new();

    for attempt in 1..=retries {
        link.write_line(command)?;
        status = link.read_line()?;
        pause(timing.settle);

        let mut polls = 0;
        let mut busy_polls = 0;
        loop {
            while link.is_busy()? {
                status = link.read_line()?;
                debug!("{}", status);
            }

            if AtStatus::classify(&status).is_final() {
                break;
            }

            let busy = status.contains("busy");
            if polls >= wait && !(busy && busy_polls < timing.busy_limit) {
                break;
            }
            if polls >= wait {
                busy_polls += 1;
            }

            pause(timing.poll_interval);
            polls += 1;
        }

        if AtStatus::classify(&status) == AtStatus::Success {
            return Ok(status);
        }

        warn!("{}: attempt {}/{} ended with {:?}", command, attempt, retries, status);
        pause(timing.retry_delay);
    }

    Err(AtError::RetriesExhausted {
        command: command.to_string(),
        attempts: retries,
        last: status,
    })
}
