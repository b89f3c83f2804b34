//! UART wrapper
//!
//! Line-oriented access to one of the SoC's UART instances. Commands are
//! written with a CRLF terminator and responses are read a line at a time,
//! which is what AT-command modules such as the ESP8266 speak.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};

use crate::{Board, DriverError, PinMode, Result, UartPins};

/// Byte stream with a receive queue
pub trait SerialIo: Read + Write + Send {
    /// Number of bytes received and not yet read
    fn bytes_to_read(&self) -> io::Result<u32>;

    /// Discard everything received and not yet read
    fn clear_input(&self) -> io::Result<()>;
}

impl SerialIo for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }

    fn clear_input(&self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// A UART instance routed to the header
pub struct Uart<P: SerialIo = Box<dyn SerialPort>> {
    name: &'static str,
    path: String,
    port: P,
}

impl Uart {
    /// Mux the instance's TX and RX pins and open its serial port
    ///
    /// # Arguments
    /// * `uart` - instance name such as `UART1`
    /// * `baud_rate` - line speed, e.g. 115200 for an ESP8266
    ///
    /// # Errors
    /// - `UnknownUart` before anything is touched
    /// - `HelperFailure` if `config-pin` fails for either pin (fail-fast)
    /// - `Serial` if the port cannot be opened
    pub fn init(board: &Board, uart: &str, baud_rate: u32) -> Result<Self> {
        let pins = UartPins::lookup(uart)?;
        for pin in [pins.tx, pins.rx] {
            board.pinmux().configure(pin, PinMode::Uart)?;
        }

        let serial = &board.config().serial;
        let path = pins.device_path(&serial.prefix);
        let open = || {
            serialport::new(path.as_str(), baud_rate)
                .timeout(Duration::from_millis(serial.timeout_ms))
                .open()
                .map_err(|source| DriverError::Serial {
                    path: path.clone(),
                    source,
                })
        };

        // Start from a clean line state even if something left it open
        drop(open()?);
        let port = open()?;

        info!("{} opened on {} at {} baud", pins.name, path, baud_rate);
        Ok(Self {
            name: pins.name,
            path,
            port,
        })
    }
}

impl<P: SerialIo> Uart<P> {
    /// Wrap an already opened port
    pub fn from_port(name: &'static str, path: impl Into<String>, port: P) -> Self {
        Self {
            name,
            path: path.into(),
            port,
        }
    }

    fn io_error(&self, source: io::Error) -> DriverError {
        DriverError::SerialIo {
            path: self.path.clone(),
            source,
        }
    }

    /// Discard pending input, then send `command` terminated by CRLF
    pub fn write(&mut self, command: &str) -> Result<()> {
        self.port.clear_input().map_err(|e| self.io_error(e))?;

        let mut line = Vec::with_capacity(command.len() + 2);
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(b"\r\n");

        debug!("{} <- {}", self.name, command);
        self.port.write_all(&line).map_err(|e| self.io_error(e))?;
        self.port.flush().map_err(|e| self.io_error(e))
    }

    /// Read one line with the CR/LF terminator removed
    ///
    /// Blocks until a newline arrives: per-read timeouts of the port are
    /// retried. Returns whatever was received if the stream ends first.
    pub fn read(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
                Err(e) => return Err(self.io_error(e)),
            }
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_matches(|c| c == '\r' || c == '\n').to_string();
        debug!("{} -> {}", self.name, text);
        Ok(text)
    }

    /// Whether received bytes are waiting to be read
    pub fn is_busy(&self) -> Result<bool> {
        let waiting = self.port.bytes_to_read().map_err(|e| self.io_error(e))?;
        Ok(waiting > 0)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Serial device node, e.g. `/dev/ttyO1`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the port
    pub fn free(self) {
        info!("{} closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinmux::PinMux;
    use crate::BoardConfig;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory port: `rx` is what the remote end sent, `tx` what we wrote
    #[derive(Default)]
    struct MemoryPort {
        rx: Mutex<VecDeque<u8>>,
        tx: Vec<u8>,
        timeouts: usize,
    }

    impl MemoryPort {
        fn receiving(text: &str) -> Self {
            Self {
                rx: Mutex::new(text.bytes().collect()),
                ..Self::default()
            }
        }
    }

    impl Read for MemoryPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.timeouts > 0 {
                self.timeouts -= 1;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            match self.rx.get_mut().unwrap().pop_front() {
                Some(byte) if !buf.is_empty() => {
                    buf[0] = byte;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    impl Write for MemoryPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialIo for MemoryPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(self.rx.lock().unwrap().len() as u32)
        }

        fn clear_input(&self) -> io::Result<()> {
            self.rx.lock().unwrap().clear();
            Ok(())
        }
    }

    fn uart(port: MemoryPort) -> Uart<MemoryPort> {
        Uart::from_port("UART1", "/dev/ttyO1", port)
    }

    #[test]
    fn test_write_appends_crlf() {
        let mut uart = uart(MemoryPort::default());
        uart.write("AT+CWMODE=1").unwrap();
        assert_eq!(uart.port.tx, b"AT+CWMODE=1\r\n");
    }

    #[test]
    fn test_write_discards_stale_input() {
        let mut uart = uart(MemoryPort::receiving("busy p...\r\nOK\r\n"));
        assert!(uart.is_busy().unwrap());

        uart.write("AT+CIPSEND=0,2").unwrap();
        assert!(!uart.is_busy().unwrap());
        // Only replies that arrive after the command are read
        assert_eq!(uart.read().unwrap(), "");
        assert_eq!(uart.port.tx, b"AT+CIPSEND=0,2\r\n");
    }

    #[test]
    fn test_read_strips_line_ending() {
        let mut uart = uart(MemoryPort::receiving("OK\r\nready\r\n"));
        assert!(uart.is_busy().unwrap());
        assert_eq!(uart.read().unwrap(), "OK");
        assert_eq!(uart.read().unwrap(), "ready");
        assert!(!uart.is_busy().unwrap());
    }

    #[test]
    fn test_read_waits_through_timeouts() {
        let mut port = MemoryPort::receiving("SEND OK\r\n");
        port.timeouts = 3;
        let mut uart = uart(port);
        assert_eq!(uart.read().unwrap(), "SEND OK");
    }

    #[test]
    fn test_read_at_end_of_stream() {
        let mut uart = uart(MemoryPort::receiving("partial"));
        assert_eq!(uart.read().unwrap(), "partial");
        assert_eq!(uart.read().unwrap(), "");
    }

    struct Recorder(Mutex<Vec<(String, PinMode)>>);

    impl PinMux for Recorder {
        fn configure(&self, pin: &str, mode: PinMode) -> crate::Result<()> {
            self.0.lock().unwrap().push((pin.to_string(), mode));
            Ok(())
        }
    }

    #[test]
    fn test_unknown_uart_touches_nothing() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let board = Board::new(BoardConfig::default()).with_pinmux(recorder.clone());

        let result = Uart::init(&board, "UART3", 115_200);
        assert!(matches!(result, Err(DriverError::UnknownUart { .. })));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_init_muxes_both_pins() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut config = BoardConfig::default();
        config.serial.prefix = "/dev/definitely-not-a-tty".to_string();
        let board = Board::new(config).with_pinmux(recorder.clone());

        let result = Uart::init(&board, "uart1", 115_200);
        assert!(matches!(result, Err(DriverError::Serial { .. })));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                ("P9_24".to_string(), PinMode::Uart),
                ("P9_26".to_string(), PinMode::Uart),
            ]
        );
    }
}
