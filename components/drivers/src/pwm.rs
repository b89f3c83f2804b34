//! PWM wrapper

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::protocol::{self, PWM_RESPONSE_LEN};
use crate::{Board, CharDevice, Command, DriverError, Pin, PinMode, PwmChannel, PwmTiming, Result};

const NANOS_PER_SECOND: f64 = 1e9;

impl PwmTiming {
    /// Convert a duty fraction and frequency to nanosecond timing
    ///
    /// `period = round(1e9 / frequency_hz)` and
    /// `duty = round(period * duty_percent)`. The duty is not clamped:
    /// a fraction above 1 yields a duty longer than the period.
    ///
    /// # Errors
    /// Returns `InvalidArgument` unless `frequency_hz` is finite and
    /// positive and `duty_percent` is finite and non-negative, or when either
    /// value does not fit the driver's 32-bit nanosecond fields (below about
    /// 0.233 Hz)
    pub fn from_duty(duty_percent: f64, frequency_hz: f64) -> Result<Self> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(DriverError::InvalidArgument(format!(
                "PWM frequency must be positive, got {frequency_hz}"
            )));
        }
        if !duty_percent.is_finite() || duty_percent < 0.0 {
            return Err(DriverError::InvalidArgument(format!(
                "PWM duty must be a non-negative fraction, got {duty_percent}"
            )));
        }

        let period = (NANOS_PER_SECOND / frequency_hz).round();
        let period_ns = nanos(period).ok_or_else(|| {
            DriverError::InvalidArgument(format!(
                "PWM period of {period} ns at {frequency_hz} Hz exceeds {} ns",
                u32::MAX
            ))
        })?;
        let duty = (f64::from(period_ns) * duty_percent).round();
        let duty_ns = nanos(duty).ok_or_else(|| {
            DriverError::InvalidArgument(format!(
                "PWM duty of {duty} ns exceeds {} ns",
                u32::MAX
            ))
        })?;
        Ok(Self { duty_ns, period_ns })
    }

    /// Duty cycle as a fraction of the period
    pub fn duty_fraction(&self) -> f64 {
        if self.period_ns == 0 {
            return 0.0;
        }
        f64::from(self.duty_ns) / f64::from(self.period_ns)
    }
}

fn nanos(value: f64) -> Option<u32> {
    (value <= f64::from(u32::MAX)).then_some(value as u32)
}

/// sysfs directory holding the `pwmchipN` entry for `channel`
pub fn chip_directory(sysfs_root: &Path, channel: &PwmChannel) -> PathBuf {
    sysfs_root
        .join("devices/platform/ocp")
        .join(format!("{}.epwmss", channel.chip))
        .join(format!("{}.pwm", channel.addr))
        .join("pwm")
}

/// Find the pwm id of `channel`
///
/// The kernel numbers pwm chips at boot, so the id is only valid until the
/// next power cycle. The id is the chip's base number plus the channel index.
///
/// # Errors
/// Returns `PwmChipNotFound` if the directory is missing or has no
/// `pwmchipN` entry
pub fn resolve_pwm_id(sysfs_root: &Path, channel: &PwmChannel) -> Result<u32> {
    let dir = chip_directory(sysfs_root, channel);
    let not_found = || DriverError::PwmChipNotFound { path: dir.clone() };

    let entries = fs::read_dir(&dir).map_err(|_| not_found())?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(base) = name
            .to_str()
            .and_then(|n| n.strip_prefix("pwmchip"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };

        debug!("{}: found pwmchip{}", dir.display(), base);
        return Ok(base + channel.index);
    }

    Err(not_found())
}

/// A header pin driven through the bbpwm device
pub struct Pwm {
    pin: Pin,
    id: u32,
    device: Arc<dyn CharDevice>,
}

impl Pwm {
    /// Mux `pin` to PWM and claim its channel from the driver
    ///
    /// # Errors
    /// - `UnknownPin` / `NotCapable` before anything is touched
    /// - `HelperFailure` if `config-pin` fails (fail-fast)
    /// - `PwmChipNotFound` if sysfs has no chip for the channel
    pub fn init(board: &Board, pin: &str) -> Result<Self> {
        let pin = Pin::lookup(pin)?;
        let channel = pin.require_pwm()?;

        board.pinmux().configure(pin.key(), PinMode::Pwm)?;
        let id = resolve_pwm_id(&board.config().sysfs.root, &channel)?;

        let device = board.pwm_device()?;
        Command::PwmInit { id }.send(device.as_ref())?;

        info!("PWM {} initialised as pwm {}", pin, id);
        Ok(Self { pin, id, device })
    }

    /// Read the current timing from the driver
    pub fn read(&self) -> Result<PwmTiming> {
        let response = Command::PwmRead { id: self.id }.query(self.device.as_ref(), PWM_RESPONSE_LEN)?;
        protocol::parse_pwm_timing(self.device.as_ref(), &response)
    }

    /// Output `duty_percent` (a fraction in `[0, 1]`) at `frequency_hz`
    ///
    /// # Returns
    /// The timing sent to the driver
    pub fn write(&self, duty_percent: f64, frequency_hz: f64) -> Result<PwmTiming> {
        let timing = PwmTiming::from_duty(duty_percent, frequency_hz)?;
        self.write_timing(timing)?;
        Ok(timing)
    }

    /// Output an explicit nanosecond timing
    pub fn write_timing(&self, timing: PwmTiming) -> Result<()> {
        Command::PwmWrite { id: self.id, timing }.send(self.device.as_ref())
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Kernel pwm id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Release the channel back to the driver
    pub fn free(self) -> Result<()> {
        Command::PwmFree { id: self.id }.send(self.device.as_ref())?;
        info!("PWM {} freed", self.pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> PwmChannel {
        Pin::lookup("P9_14").unwrap().require_pwm().unwrap()
    }

    #[test]
    fn test_timing_boundaries() {
        for frequency in [1.0, 60.0, 1000.0] {
            let period = (1e9_f64 / frequency).round() as u32;

            let off = PwmTiming::from_duty(0.0, frequency).unwrap();
            assert_eq!(off.period_ns, period);
            assert_eq!(off.duty_ns, 0);

            let on = PwmTiming::from_duty(1.0, frequency).unwrap();
            assert_eq!(on.period_ns, period);
            assert_eq!(on.duty_ns, period);
        }
    }

    #[test]
    fn test_timing_rounding() {
        let timing = PwmTiming::from_duty(0.03, 60.0).unwrap();
        assert_eq!(timing.period_ns, 16_666_667);
        assert_eq!(timing.duty_ns, 500_000);

        let timing = PwmTiming::from_duty(0.5, 1000.0).unwrap();
        assert_eq!(timing.period_ns, 1_000_000);
        assert_eq!(timing.duty_ns, 500_000);
        assert!((timing.duty_fraction() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_timing_rejects_bad_frequency() {
        assert!(PwmTiming::from_duty(0.5, 0.0).is_err());
        assert!(PwmTiming::from_duty(0.5, -60.0).is_err());
        assert!(PwmTiming::from_duty(0.5, f64::NAN).is_err());
        assert!(PwmTiming::from_duty(-0.1, 60.0).is_err());
    }

    #[test]
    fn test_duty_is_not_clamped() {
        let timing = PwmTiming::from_duty(1.5, 1000.0).unwrap();
        assert!(timing.duty_ns > timing.period_ns);
    }

    #[test]
    fn test_timing_fits_driver_fields() {
        // 10 s period
        let result = PwmTiming::from_duty(0.5, 0.1);
        assert!(matches!(result, Err(DriverError::InvalidArgument(_))));
        assert!(PwmTiming::from_duty(0.5, 1e-12).is_err());

        // 1 Hz is well inside the range
        let timing = PwmTiming::from_duty(1.0, 1.0).unwrap();
        assert_eq!(timing.period_ns, 1_000_000_000);

        // Longest representable period, then a duty that overruns it
        let slowest = 1e9 / f64::from(u32::MAX);
        let timing = PwmTiming::from_duty(1.0, slowest).unwrap();
        assert_eq!(timing.period_ns, u32::MAX);
        assert!(PwmTiming::from_duty(1.5, slowest).is_err());
    }

    #[test]
    fn test_chip_directory() {
        let dir = chip_directory(Path::new("/sys"), &channel());
        assert_eq!(
            dir,
            PathBuf::from("/sys/devices/platform/ocp/48302000.epwmss/48302200.pwm/pwm")
        );
    }

    #[test]
    fn test_resolve_pwm_id() {
        let root = tempfile::tempdir().unwrap();
        let dir = chip_directory(root.path(), &channel());
        fs::create_dir_all(dir.join("pwmchip2")).unwrap();

        assert_eq!(resolve_pwm_id(root.path(), &channel()).unwrap(), 2);

        let b = Pin::lookup("P9_16").unwrap().require_pwm().unwrap();
        assert_eq!(resolve_pwm_id(root.path(), &b).unwrap(), 3);
    }

    #[test]
    fn test_resolve_multi_digit_chip() {
        let root = tempfile::tempdir().unwrap();
        let dir = chip_directory(root.path(), &channel());
        fs::create_dir_all(dir.join("pwmchip12")).unwrap();

        assert_eq!(resolve_pwm_id(root.path(), &channel()).unwrap(), 12);
    }

    #[test]
    fn test_resolve_missing_chip() {
        let root = tempfile::tempdir().unwrap();
        let result = resolve_pwm_id(root.path(), &channel());
        assert!(matches!(result, Err(DriverError::PwmChipNotFound { .. })));

        fs::create_dir_all(chip_directory(root.path(), &channel()).join("export")).unwrap();
        let result = resolve_pwm_id(root.path(), &channel());
        assert!(matches!(result, Err(DriverError::PwmChipNotFound { .. })));
    }
}
