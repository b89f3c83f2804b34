//! bbio - BeagleBone Black peripheral demos
//!
//! Commands:
//! - `bbio gpio read|write` - one-shot pin access
//! - `bbio pwm write` - set a PWM duty cycle and frequency
//! - `bbio blink` - blink an LED
//! - `bbio servo` - sweep an SG90 servo
//! - `bbio range` - measure a distance with an HC-SR04
//! - `bbio watch` - print interrupt edges until Ctrl-C
//! - `bbio bridge` - control pins over WiFi through an ESP8266
//! - `bbio pins` - show the header pin table

mod commands;
mod stop;

use std::path::PathBuf;
use std::process;

use bbio_drivers::{Board, BoardConfig, DriverError};
use bbio_esp8266::AtError;
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "bbio")]
#[command(version)]
#[command(about = "GPIO, PWM, interrupt and UART demos for the BeagleBone Black", long_about = None)]
struct Cli {
    /// Board configuration file (default: $BBIO_CONFIG, then .bbio/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or write a GPIO pin
    Gpio {
        #[command(subcommand)]
        action: GpioAction,
    },

    /// Drive a PWM pin
    Pwm {
        #[command(subcommand)]
        action: PwmAction,
    },

    /// Blink an LED
    Blink {
        /// LED pin
        #[arg(default_value = "P8_19")]
        pin: String,

        /// Seconds between toggles
        #[arg(short, long, default_value_t = 1.0)]
        interval: f64,

        /// Seconds before stopping
        #[arg(short, long, default_value_t = 10.0)]
        timeout: f64,
    },

    /// Sweep an SG90 servo from one end to the other
    Servo {
        /// PWM pin
        #[arg(default_value = "P9_14")]
        pin: String,

        /// Position step, a fraction of the full sweep
        #[arg(short, long, default_value_t = 0.1)]
        increment: f64,
    },

    /// Measure a distance with an HC-SR04 ultrasonic sensor
    Range {
        /// Trigger pin
        #[arg(long, default_value = "P8_14")]
        trigger: String,

        /// Echo pin
        #[arg(long, default_value = "P8_13")]
        echo: String,
    },

    /// Attach interrupts and print every edge until Ctrl-C
    Watch {
        /// Input pins
        #[arg(required = true)]
        pins: Vec<String>,
    },

    /// Serve LED and interrupt requests over WiFi through an ESP8266
    Bridge {
        /// UART the module is wired to
        #[arg(default_value = "UART1")]
        uart: String,

        /// Network to join
        ssid: String,

        /// Network password
        password: String,

        /// TCP port to listen on
        #[arg(short, long, default_value_t = 5000)]
        port: u16,
    },

    /// Show the header pin table
    Pins,
}

#[derive(Subcommand)]
enum GpioAction {
    /// Print the level of a pin
    Read {
        pin: String,
    },

    /// Drive a pin low (0) or high (1)
    Write {
        pin: String,

        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        value: u8,
    },
}

#[derive(Subcommand)]
enum PwmAction {
    /// Output a duty cycle (fraction 0..1) at a frequency in Hz
    Write {
        pin: String,
        duty: f64,
        frequency: f64,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BoardConfig::discover(cli.config.as_deref())?;
    let board = Board::new(config);

    let result = match cli.command {
        Commands::Gpio { action } => match action {
            GpioAction::Read { pin } => commands::gpio::read(&board, &pin),
            GpioAction::Write { pin, value } => commands::gpio::write(&board, &pin, value),
        },
        Commands::Pwm { action } => match action {
            PwmAction::Write {
                pin,
                duty,
                frequency,
            } => commands::pwm::write(&board, &pin, duty, frequency),
        },
        Commands::Blink {
            pin,
            interval,
            timeout,
        } => commands::blink::run(&board, &pin, interval, timeout),
        Commands::Servo { pin, increment } => commands::servo::run(&board, &pin, increment),
        Commands::Range { trigger, echo } => commands::range::run(&board, &trigger, &echo),
        Commands::Watch { pins } => commands::watch::run(&board, &pins),
        Commands::Bridge {
            uart,
            ssid,
            password,
            port,
        } => commands::bridge::run(&board, &uart, &ssid, &password, port),
        Commands::Pins => {
            commands::pins::show();
            Ok(())
        }
    };

    board.shutdown();
    result
}

/// Exit code requested by a fail-fast driver error anywhere in the chain
fn fail_fast_code(err: &anyhow::Error) -> Option<i32> {
    err.chain().find_map(|cause| {
        if let Some(driver) = cause.downcast_ref::<DriverError>() {
            return driver.exit_code();
        }
        match cause.downcast_ref::<AtError>() {
            Some(AtError::Link(driver)) => driver.exit_code(),
            _ => None,
        }
    })
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        if let Some(code) = fail_fast_code(&err) {
            eprintln!("Error while running config-pin, exiting...");
            process::exit(code);
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbio_drivers::PinMode;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_gpio_write() {
        let cli = Cli::try_parse_from(["bbio", "-v", "gpio", "write", "P8_19", "1"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Commands::Gpio {
                action: GpioAction::Write { value: 1, .. }
            }
        ));

        assert!(Cli::try_parse_from(["bbio", "gpio", "write", "P8_19", "2"]).is_err());
    }

    #[test]
    fn test_watch_needs_a_pin() {
        assert!(Cli::try_parse_from(["bbio", "watch"]).is_err());
    }

    #[test]
    fn test_fail_fast_code_found_in_chain() {
        let helper = DriverError::HelperFailure {
            pin: "P9_24".into(),
            mode: PinMode::Uart,
            code: 5,
        };
        let err = anyhow::Error::new(AtError::Link(helper)).context("bridge setup");
        assert_eq!(fail_fast_code(&err), Some(5));

        let other = anyhow::anyhow!("no echo");
        assert_eq!(fail_fast_code(&other), None);
    }
}
