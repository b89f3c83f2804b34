use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use bbio_drivers::{Board, Direction, Gpio, Level};
use colored::Colorize;

/// Farthest distance the HC-SR04 reports reliably
pub const MAX_RANGE_CM: f64 = 400.0;

/// Echo pulse length per centimetre of distance (sound out and back)
const MICROS_PER_CM: f64 = 58.0;

/// Longest wait for either edge of the echo pulse
const ECHO_TIMEOUT: Duration = Duration::from_millis(100);

/// Distance for an echo pulse of `pulse` length
pub fn distance_cm(pulse: Duration) -> f64 {
    pulse.as_secs_f64() * 1e6 / MICROS_PER_CM
}

/// Raise the trigger for 10 µs to start a measurement
fn trigger_pulse(trigger: &mut Gpio) -> anyhow::Result<()> {
    trigger.write(Level::Low)?;
    thread::sleep(Duration::from_micros(2));
    trigger.write(Level::High)?;
    thread::sleep(Duration::from_micros(10));
    trigger.write(Level::Low)?;
    Ok(())
}

/// Wait until `echo` reads `level`
fn wait_for(echo: &mut Gpio, level: Level) -> anyhow::Result<Instant> {
    let start = Instant::now();
    while echo.read()? != level {
        if start.elapsed() > ECHO_TIMEOUT {
            bail!("No echo on {} (waited for {})", echo.pin(), level);
        }
    }
    Ok(Instant::now())
}

fn measure(trigger: &mut Gpio, echo: &mut Gpio) -> anyhow::Result<Duration> {
    trigger_pulse(trigger)?;
    let rise = wait_for(echo, Level::High)?;
    let fall = wait_for(echo, Level::Low)?;
    Ok(fall - rise)
}

pub fn run(board: &Board, trigger: &str, echo: &str) -> anyhow::Result<()> {
    let mut trigger = Gpio::init(board, trigger, Direction::Output)?;
    let mut echo = match Gpio::init(board, echo, Direction::Input) {
        Ok(echo) => echo,
        Err(e) => {
            trigger.free()?;
            return Err(e.into());
        }
    };

    let pulse = measure(&mut trigger, &mut echo);
    trigger.free()?;
    echo.free()?;

    let distance = distance_cm(pulse?);
    if distance > MAX_RANGE_CM {
        println!("{} Out of range", "✗".red());
    } else {
        println!("{} {:.1} cm", "✓".green(), distance);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_from_pulse() {
        assert!((distance_cm(Duration::from_micros(58)) - 1.0).abs() < 1e-9);
        assert!((distance_cm(Duration::from_micros(5800)) - 100.0).abs() < 1e-9);
        assert!(distance_cm(Duration::from_millis(25)) > MAX_RANGE_CM);
    }
}
