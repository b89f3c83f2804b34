use std::thread;
use std::time::Duration;

use anyhow::bail;
use bbio_drivers::{Board, Pwm};
use colored::Colorize;

use crate::stop;

/// SG90 control frequency
pub const FREQUENCY_HZ: f64 = 60.0;

/// Duty cycle at position 0
pub const DUTY_MIN: f64 = 0.03;

/// Duty cycle range covered by a full sweep
pub const DUTY_SPAN: f64 = 0.115;

const STEP_DELAY: Duration = Duration::from_millis(200);

/// Duty cycles for a sweep from position 0 to 1 in `increment` steps
pub fn sweep(increment: f64) -> anyhow::Result<Vec<f64>> {
    if !(increment > 0.0 && increment <= 1.0) {
        bail!("Increment must be in (0, 1], got {increment}");
    }

    // Small epsilon so that 1.0 is reached despite float steps
    let steps = (1.0 / increment + 1e-9).floor() as u32;
    Ok((0..=steps)
        .map(|step| DUTY_MIN + f64::from(step) * increment * DUTY_SPAN)
        .collect())
}

pub fn run(board: &Board, pin: &str, increment: f64) -> anyhow::Result<()> {
    let duties = sweep(increment)?;
    stop::install();

    let servo = Pwm::init(board, pin)?;
    println!("{} Sweeping servo on {}", "⚙".cyan(), servo.pin().to_string().bold());

    let result = (|| -> anyhow::Result<()> {
        for duty in duties {
            if stop::requested() {
                break;
            }
            let timing = servo.write(duty, FREQUENCY_HZ)?;
            println!("  duty {:.4} ({} ns)", duty, timing.duty_ns);
            thread::sleep(STEP_DELAY);
        }
        Ok(())
    })();

    servo.free()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_covers_full_range() {
        let duties = sweep(0.1).unwrap();
        assert_eq!(duties.len(), 11);
        assert!((duties[0] - DUTY_MIN).abs() < 1e-12);
        assert!((duties[10] - (DUTY_MIN + DUTY_SPAN)).abs() < 1e-12);
        assert!(duties.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sweep_uneven_increment() {
        let duties = sweep(0.3).unwrap();
        assert_eq!(duties.len(), 4);
        assert!(*duties.last().unwrap() < DUTY_MIN + DUTY_SPAN);
    }

    #[test]
    fn test_sweep_rejects_bad_increment() {
        assert!(sweep(0.0).is_err());
        assert!(sweep(-0.1).is_err());
        assert!(sweep(1.5).is_err());
        assert!(sweep(f64::NAN).is_err());
    }
}
