use bbio_drivers::{Board, Pwm};
use colored::Colorize;

/// Start the output and leave it running after exit
pub fn write(board: &Board, pin: &str, duty: f64, frequency: f64) -> anyhow::Result<()> {
    let pwm = Pwm::init(board, pin)?;
    let timing = pwm.write(duty, frequency)?;

    println!(
        "{} {} (pwm {}): duty {} ns / period {} ns",
        "✓".green(),
        pwm.pin().to_string().bold(),
        pwm.id(),
        timing.duty_ns,
        timing.period_ns
    );
    Ok(())
}
