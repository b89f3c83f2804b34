//! Character Device Access - byte-level I/O on the bbio kernel modules
//!
//! # Purpose
//! The bbgpio and bbpwm kernel modules expose each peripheral class as a
//! single character device node. This crate owns everything below the
//! command language: opening the node, writing one command per `write`
//! syscall, reading fixed-size responses and blocking in `poll` until the
//! driver reports interrupt bits.
//!
//! # Integration Points
//! - Depends on: the bbgpio/bbpwm kernel modules (`/dev/bbgpio`, `/dev/bbpwm`)
//! - Provides to: bbio-drivers (GPIO, PWM and interrupt wrappers)
//!
//! # Architecture
//! Two descriptor strategies implement the same [`CharDevice`] trait:
//! - [`TransientNode`] opens, acts and closes on every call. No sharing.
//! - [`SharedNode`] holds one descriptor for the whole process. Commands are
//!   serialised by a mutex so a command/response pair from one thread is
//!   never interleaved with another thread's command. `poll` bypasses that
//!   mutex so a blocked interrupt poller never stalls command traffic.
//!
//! Shared nodes are handed out by a [`DeviceRegistry`], which opens each node
//! on first use and closes all of them on `shutdown`.
//!
//! # Testing Strategy
//! - Unit tests: descriptor strategies against regular files
//! - Integration tests: registry lifecycle, concurrent command pairs
//! - Higher layers: [`mock::MockDevice`] (feature `mock`)

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;

mod node;
mod registry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use node::{SharedNode, TransientNode};
pub use registry::DeviceRegistry;

/// Error types for device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device unavailable: {path}: {source}")]
    Unavailable { path: PathBuf, source: io::Error },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Device handle closed: {path}")]
    Closed { path: PathBuf },
}

impl DeviceError {
    pub(crate) fn unavailable(path: &Path, source: io::Error) -> Self {
        DeviceError::Unavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        DeviceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = core::result::Result<T, DeviceError>;

bitflags! {
    /// Poll event bits
    ///
    /// The bbgpio driver reports pending interrupt sources as raw bits of the
    /// poll mask, so any bit may be set. The kernel always reports `ERR`,
    /// `HUP` and `NVAL`, whatever was requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u16 {
        const IN = 0x0001;
        const PRI = 0x0002;
        const OUT = 0x0004;
        const ERR = 0x0008;
        const HUP = 0x0010;
        const NVAL = 0x0020;

        const _ = !0;
    }
}

impl EventMask {
    /// Bits the kernel reports regardless of the requested events
    pub const ALWAYS_REPORTED: Self = Self::ERR.union(Self::HUP).union(Self::NVAL);

    /// Width of the poll event field in bits
    pub const WIDTH: u32 = u16::BITS;
}

/// A character device node speaking a command/response protocol
///
/// All methods take `&self`; implementations synchronise internally so one
/// device can be shared between wrappers and an interrupt poller thread.
pub trait CharDevice: Send + Sync {
    /// Path of the device node
    fn path(&self) -> &Path;

    /// Write `bytes` as a single `write` syscall
    ///
    /// # Returns
    /// Number of bytes the driver accepted
    fn write(&self, bytes: &[u8]) -> Result<usize>;

    /// Read at most `max_bytes` from the node
    fn read(&self, max_bytes: usize) -> Result<Vec<u8>>;

    /// Write a command and read its response as one unit
    ///
    /// Implementations that share a descriptor must not let another
    /// command slip between the write and the read.
    fn transact(&self, command: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
        self.write(command)?;
        self.read(max_bytes)
    }

    /// Block until one of the bits in `mask` is ready
    ///
    /// # Arguments
    /// * `mask` - Requested events
    /// * `timeout` - `None` blocks indefinitely
    ///
    /// # Returns
    /// The reported events, empty on timeout
    fn poll(&self, mask: EventMask, timeout: Option<Duration>) -> Result<EventMask>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_reported_bits() {
        assert_eq!(EventMask::ALWAYS_REPORTED.bits(), 0x38);
        assert!(!EventMask::ALWAYS_REPORTED.contains(EventMask::IN));
    }

    #[test]
    fn test_foreign_bits_retained() {
        let mask = EventMask::from_bits_retain(1 << 12);
        assert_eq!(mask.bits(), 0x1000);
        assert!(mask.intersects(EventMask::from_bits_retain(0x1000)));
    }
}
