use bbio_drivers::{Pin, UartPins};
use colored::Colorize;

pub fn show() {
    println!("{}", "Header pins".bold().green());
    println!("  {:<7} {:>5}  {}", "KEY", "GPIO", "PWM");
    for pin in Pin::all() {
        let pwm = match pin.pwm_channel() {
            Some(channel) => format!("{}.epwmss/{}.pwm #{}", channel.chip, channel.addr, channel.index),
            None => String::new(),
        };
        println!("  {:<7} {:>5}  {}", pin.key(), pin.gpio_id(), pwm);
    }

    println!("\n{}", "UARTs".bold().green());
    println!("  {:<7} {:<6} {}", "NAME", "TX", "RX");
    for uart in UartPins::all() {
        println!("  {:<7} {:<6} {}", uart.name, uart.tx, uart.rx);
    }
}
