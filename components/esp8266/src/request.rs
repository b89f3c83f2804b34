//! `+IPD` request payloads
//!
//! A client connected to the module's TCP server sends one request per
//! connection:
//!
//! ```text
//! l P8_19 1     drive the LED on P8_19 high
//! i P9_12 0     toggle the LED whenever P9_12 sees an edge
//! ```
//!
//! The firmware delivers it as `+IPD,<client>,<len>:<payload>`. Only the
//! first `<len>` bytes after the colon are the request: a `<n>,CLOSED` notice
//! for any client can follow on the same line.

use std::fmt;

use crate::{AtError, Result};

/// Marker of incoming network data
pub const IPD_PREFIX: &str = "+IPD,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `l`: write a level to an output pin
    Led,
    /// `i`: attach an interrupt that toggles the LED
    Interrupt,
}

impl RequestKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "l" => Some(RequestKind::Led),
            "i" => Some(RequestKind::Interrupt),
            _ => None,
        }
    }
}

/// One parsed client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub client: u8,
    pub kind: RequestKind,
    pub pin: String,
    pub value: u8,
}

impl BridgeRequest {
    /// Parse a `+IPD` line
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the line is not `+IPD` data, the header is
    /// not `<client>,<len>`, or the payload is not `<kind> <pin> <value>`.
    /// A payload shorter than `<len>` is parsed as received.
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = |reason| AtError::InvalidRequest {
            line: line.to_string(),
            reason,
        };

        let start = line.find(IPD_PREFIX).ok_or_else(|| invalid("no +IPD marker"))?;
        let rest = &line[start + IPD_PREFIX.len()..];
        let (header, payload) = rest.split_once(':').ok_or_else(|| invalid("no payload"))?;

        let (client, len) = header.split_once(',').ok_or_else(|| invalid("no length"))?;
        let client = client
            .trim()
            .parse::<u8>()
            .map_err(|_| invalid("bad client id"))?;
        let len = len.trim().parse::<usize>().map_err(|_| invalid("bad length"))?;

        let payload = payload
            .get(..len.min(payload.len()))
            .ok_or_else(|| invalid("length splits a character"))?;
        let mut fields = payload.split_whitespace();
        let kind = fields
            .next()
            .and_then(RequestKind::parse)
            .ok_or_else(|| invalid("unknown request kind"))?;
        let pin = fields.next().ok_or_else(|| invalid("missing pin"))?;
        let value = fields
            .next()
            .and_then(|v| v.parse::<u8>().ok())
            .ok_or_else(|| invalid("missing or bad value"))?;

        Ok(Self {
            client,
            kind,
            pin: pin.to_string(),
            value,
        })
    }
}

impl fmt::Display for BridgeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RequestKind::Led => 'l',
            RequestKind::Interrupt => 'i',
        };
        write!(f, "{} {} {}", kind, self.pin, self.value)
    }
}
