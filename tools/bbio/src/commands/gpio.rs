use bbio_drivers::{Board, Direction, Gpio, Level};
use colored::Colorize;

pub fn read(board: &Board, pin: &str) -> anyhow::Result<()> {
    let mut gpio = Gpio::init(board, pin, Direction::Input)?;
    let key = gpio.pin();
    let level = gpio.read_strict();
    gpio.free()?;

    println!("{} {} = {}", "✓".green(), key.to_string().bold(), level?);
    Ok(())
}

pub fn write(board: &Board, pin: &str, value: u8) -> anyhow::Result<()> {
    let level = Level::from(value != 0);
    let mut gpio = Gpio::init(board, pin, Direction::Output)?;
    gpio.write(level)?;

    println!("{} {} <- {}", "✓".green(), gpio.pin().to_string().bold(), level);
    Ok(())
}
