use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use bbio_drivers::{Board, Direction, Gpio};
use colored::Colorize;
use log::debug;

use crate::stop;

/// Toggle interval and the instant to stop, from seconds
fn schedule(interval: f64, timeout: f64) -> anyhow::Result<(Duration, Instant)> {
    let interval = match Duration::try_from_secs_f64(interval) {
        Ok(interval) if !interval.is_zero() => interval,
        _ => bail!("Blink interval must be a positive number of seconds, got {interval}"),
    };
    let Ok(timeout) = Duration::try_from_secs_f64(timeout) else {
        bail!("Timeout must be a non-negative number of seconds, got {timeout}");
    };
    let Some(deadline) = Instant::now().checked_add(timeout) else {
        bail!("Timeout of {}s is too far in the future", timeout.as_secs());
    };
    Ok((interval, deadline))
}

pub fn run(board: &Board, pin: &str, interval: f64, timeout: f64) -> anyhow::Result<()> {
    let (interval, deadline) = schedule(interval, timeout)?;

    stop::install();
    let mut led = Gpio::init(board, pin, Direction::Output)?;

    println!("{} Blinking {} (Ctrl-C to stop)", "💡".yellow(), led.pin().to_string().bold());

    let result = (|| -> anyhow::Result<()> {
        while Instant::now() < deadline && !stop::requested() {
            let level = led.toggle()?;
            debug!("{} -> {}", led.pin(), level);
            thread::sleep(interval);
        }
        Ok(())
    })();

    led.free()?;
    println!("{} Blinking is done", "✓".green());
    result
}
