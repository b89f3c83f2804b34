//! WiFi bridge: an ESP8266 relays pin requests from TCP clients
//!
//! `l <pin> <0|1>` drives the LED pin. `i <pin> <ignored>` attaches an
//! interrupt on `pin` that toggles the LED on every edge; it needs an LED
//! request first.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use bbio_drivers::{Board, Direction, DriverError, Gpio, Interrupt, Level, Uart};
use bbio_esp8266::{BridgeRequest, Esp8266, RequestKind};
use colored::Colorize;
use log::{error, info, warn};

use crate::stop;

const BAUD_RATE: u32 = 115_200;

/// Pause between request polls
const POLL_INTERVAL: Duration = Duration::from_millis(300);

type SharedLed = Arc<Mutex<Gpio>>;

/// Pins claimed on behalf of clients
#[derive(Default)]
struct Bridge {
    led: Option<SharedLed>,
    interrupt: Option<Interrupt>,
}

impl Bridge {
    fn handle(&mut self, board: &Board, request: &BridgeRequest) -> anyhow::Result<()> {
        match request.kind {
            RequestKind::Led => {
                let led = match &self.led {
                    Some(led) => Arc::clone(led),
                    None => {
                        let gpio = Gpio::init(board, &request.pin, Direction::Output)?;
                        let led = Arc::new(Mutex::new(gpio));
                        self.led = Some(Arc::clone(&led));
                        led
                    }
                };
                let level = Level::from(request.value != 0);
                led.lock().unwrap_or_else(PoisonError::into_inner).write(level)?;
                println!("{} LED <- {}", "💡".yellow(), level);
            }
            RequestKind::Interrupt => {
                let Some(led) = self.led.clone() else {
                    warn!("Interrupt request for {} before any LED request, ignored", request.pin);
                    return Ok(());
                };

                // Replacing an interrupt releases the previous one first
                if let Some(previous) = self.interrupt.take() {
                    previous.free()?;
                }

                let mut irq = Interrupt::init(board, &request.pin)?;
                irq.attach(move || {
                    let mut led = led.lock().unwrap_or_else(PoisonError::into_inner);
                    match led.toggle() {
                        Ok(level) => info!("Interrupt detected, LED is {} now", level),
                        Err(e) => error!("Interrupt could not toggle the LED: {}", e),
                    }
                })?;
                println!("{} Interrupt attached on {}", "⚡".yellow(), irq.gpio().pin());
                self.interrupt = Some(irq);
            }
        }
        Ok(())
    }

    fn free(self) -> anyhow::Result<()> {
        if let Some(irq) = self.interrupt {
            irq.free()?;
        }
        if let Some(led) = self.led {
            match Arc::try_unwrap(led) {
                Ok(led) => led.into_inner().unwrap_or_else(PoisonError::into_inner).free()?,
                Err(_) => warn!("LED still shared at teardown, not freed"),
            }
        }
        Ok(())
    }
}

pub fn run(board: &Board, uart: &str, ssid: &str, password: &str, port: u16) -> anyhow::Result<()> {
    stop::install();

    let uart = Uart::init(board, uart, BAUD_RATE)?;
    let mut esp = Esp8266::new(uart);

    println!("{} Setting up ESP8266 on {}", "📡".cyan(), esp.link().name().bold());
    let failed = esp.setup(ssid, password, port).context("ESP8266 setup")?;
    for command in &failed {
        println!("{} {} got no success response", "✗".red(), command);
    }
    println!("{} Listening on port {} (Ctrl-C to stop)", "✓".green(), port);

    let mut bridge = Bridge::default();
    let result = (|| -> anyhow::Result<()> {
        while !stop::requested() {
            if let Some(request) = esp.poll_request()? {
                if let Err(e) = bridge.handle(board, &request) {
                    // A failed pin-mux helper ends the bridge; anything else is per request
                    if e.downcast_ref::<DriverError>().and_then(DriverError::exit_code).is_some() {
                        return Err(e);
                    }
                    println!("{} {}: {:#}", "✗".red(), request, e);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    })();

    bridge.free()?;
    esp.into_link().free();
    result
}
