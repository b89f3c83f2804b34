//! Ctrl-C handling
//!
//! Long-running demos poll [`requested`] and tear down their pins before
//! returning, so a Ctrl-C never leaves a pin claimed in the driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signum: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

/// Route SIGINT to the stop flag
pub fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // SAFETY: the handler only stores to an atomic
        unsafe {
            libc::signal(libc::SIGINT, on_sigint as *const () as libc::sighandler_t);
        }
    });
}

/// Whether Ctrl-C was pressed
pub fn requested() -> bool {
    STOP.load(Ordering::SeqCst)
}
