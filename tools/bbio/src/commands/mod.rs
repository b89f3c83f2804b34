//! One module per demo

pub mod blink;
pub mod bridge;
pub mod gpio;
pub mod pins;
pub mod pwm;
pub mod range;
pub mod servo;
pub mod watch;
