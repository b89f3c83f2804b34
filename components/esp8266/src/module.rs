//! ESP8266 module driver

use std::thread;

use log::{debug, info, warn};

use crate::at::{send_cmd, AtLink, AtTiming};
use crate::request::{BridgeRequest, IPD_PREFIX};
use crate::{AtError, Result};

/// Attempts per setup command
const SETUP_RETRIES: u32 = 5;

/// An ESP8266 behind an [`AtLink`]
pub struct Esp8266<L: AtLink> {
    link: L,
    timing: AtTiming,
}

impl<L: AtLink> Esp8266<L> {
    pub fn new(link: L) -> Self {
        Self::with_timing(link, AtTiming::default())
    }

    pub fn with_timing(link: L, timing: AtTiming) -> Self {
        Self { link, timing }
    }

    /// Send one command with the module's timing
    pub fn command(&mut self, command: &str, wait: u32) -> Result<String> {
        send_cmd(&mut self.link, command, wait, SETUP_RETRIES, &self.timing)
    }

    /// Join `ssid` and serve TCP on `port`
    ///
    /// A step that never gets a success response is logged and skipped, so
    /// a module that is already configured still comes up.
    ///
    /// # Returns
    /// The commands that failed
    ///
    /// # Errors
    /// Only transport errors abort the sequence
    pub fn setup(&mut self, ssid: &str, password: &str, port: u16) -> Result<Vec<String>> {
        let steps = [
            ("AT".to_string(), 1),
            ("AT+CWMODE=1".to_string(), 1),
            ("AT+RST".to_string(), 1),
            (format!("AT+CWJAP=\"{ssid}\",\"{password}\""), 5),
            ("AT+CIFSR".to_string(), 5),
            ("AT+CIPMUX=1".to_string(), 1),
            (format!("AT+CIPSERVER=1,{port}"), 1),
        ];

        let mut failed = Vec::new();
        for (command, wait) in steps {
            match self.command(&command, wait) {
                Ok(_) => {}
                Err(AtError::RetriesExhausted { last, .. }) => {
                    warn!("Setup step {:?} failed (last: {:?}), continuing", command, last);
                    failed.push(command);
                }
                Err(e) => return Err(e),
            }
        }

        info!("ESP8266 listening on port {} ({} setup steps failed)", port, failed.len());
        Ok(failed)
    }

    /// Drain buffered output and return the last request seen
    ///
    /// Lines that are not requests are logged at debug level. Malformed
    /// requests are logged and dropped.
    pub fn poll_request(&mut self) -> Result<Option<BridgeRequest>> {
        let mut request = None;

        while self.link.is_busy()? {
            let line = self.link.read_line()?;
            debug!("{}", line);

            if !line.contains(IPD_PREFIX) {
                continue;
            }
            match BridgeRequest::parse(&line) {
                Ok(parsed) => {
                    info!("Request from client {}: {}", parsed.client, parsed);
                    request = Some(parsed);
                }
                Err(e) => warn!("{}", e),
            }
        }

        Ok(request)
    }

    /// Send `message` to `client` and close the connection
    ///
    /// # Returns
    /// Whether the module confirmed with `SEND OK`
    pub fn send_message(&mut self, client: u8, message: &str) -> Result<bool> {
        self.link
            .write_line(&format!("AT+CIPSEND={},{}", client, message.len()))?;
        thread::sleep(self.timing.send_settle);
        self.link.write_line(message)?;
        thread::sleep(self.timing.send_settle);

        let mut sent = false;
        for _ in 0..self.timing.send_polls {
            while self.link.is_busy()? {
                let line = self.link.read_line()?;
                debug!("{}", line);
                if line.trim() == "SEND OK" {
                    sent = true;
                }
            }
            if sent {
                break;
            }
            thread::sleep(self.timing.send_poll);
        }

        if !sent {
            warn!("Client {}: no SEND OK for {:?}", client, message);
        }

        thread::sleep(self.timing.send_settle);
        self.link.write_line(&format!("AT+CIPCLOSE={client}"))?;
        thread::sleep(self.timing.send_settle);
        Ok(sent)
    }

    pub fn link(&mut self) -> &mut L {
        &mut self.link
    }

    /// Release the link
    pub fn into_link(self) -> L {
        self.link
    }
}
