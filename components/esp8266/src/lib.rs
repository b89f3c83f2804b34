//! ESP8266 WiFi Module Driver - AT commands over a UART
//!
//! # Purpose
//! Drives an ESP8266 running the stock AT firmware: joins a network, starts
//! a TCP server and turns incoming `+IPD` payloads into pin requests for the
//! board.
//!
//! # Integration Points
//! - Depends on: bbio-drivers ([`bbio_drivers::Uart`])
//! - Provides to: the `bbio bridge` command
//!
//! # Architecture
//! - [`at`]: status tokens, the [`AtLink`] transport trait and the bounded
//!   [`send_cmd`] retry loop
//! - [`request`]: `+IPD` payload parsing into [`BridgeRequest`]
//! - [`module`]: the [`Esp8266`] setup sequence, request polling and replies
//!
//! # Testing Strategy
//! - Unit tests: token classification, payload parsing, retry bounds
//! - Integration tests: full setup and request round trip over a scripted link

use thiserror::Error;

use bbio_drivers::DriverError;

pub mod at;
pub mod module;
pub mod request;

pub use at::{send_cmd, AtLink, AtStatus, AtTiming};
pub use module::Esp8266;
pub use request::{BridgeRequest, RequestKind};

/// AT layer error types
#[derive(Debug, Error)]
pub enum AtError {
    #[error("{command:?} got no success response after {attempts} attempts (last: {last:?})")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        last: String,
    },

    #[error("Invalid request {line:?}: {reason}")]
    InvalidRequest { line: String, reason: &'static str },

    #[error(transparent)]
    Link(#[from] DriverError),
}

pub type Result<T> = core::result::Result<T, AtError>;
