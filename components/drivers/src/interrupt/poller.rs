//! Polling-thread interrupt delivery

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};

use super::Callback;
use crate::{CharDevice, DriverError, EventMask, Result};

/// Worker thread blocking in `poll` for one interrupt source
///
/// The callback runs on the worker thread, one invocation at a time. An
/// edge that arrives while the callback is running is not queued.
pub(crate) struct PollWorker {
    attached: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    joinable: bool,
}

impl PollWorker {
    /// Start polling `device` for `events`
    ///
    /// With `timeout` set the worker re-checks its attached flag at least
    /// that often; with `None` it only notices a detach after its next edge.
    pub(crate) fn spawn(
        name: String,
        device: Arc<dyn CharDevice>,
        events: EventMask,
        timeout: Option<Duration>,
        mut callback: Callback,
    ) -> Result<Self> {
        let attached = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&attached);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    let ready = match device.poll(events, timeout) {
                        Ok(ready) => ready,
                        Err(e) => {
                            error!("{}: poll failed, stopping: {}", name, e);
                            break;
                        }
                    };

                    if ready.intersects(EventMask::ERR | EventMask::NVAL) {
                        error!("{}: device reported {:?}, stopping", name, ready);
                        break;
                    }

                    if ready.intersects(events) && flag.load(Ordering::Acquire) {
                        callback();
                    }
                }
                debug!("{}: worker exited", name);
            })
            .map_err(|e| DriverError::Spawn {
                name: "interrupt worker".to_string(),
                source: e,
            })?;

        Ok(Self {
            attached,
            handle: Some(handle),
            joinable: timeout.is_some(),
        })
    }

    /// Whether the worker thread is still running
    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Clear the attached flag and, when the worker wakes up on its own, wait for it
    pub(crate) fn stop(&mut self) {
        self.attached.store(false, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return;
        };

        // A worker blocked without a timeout exits after its next edge
        if !self.joinable || handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            warn!("Interrupt callback panicked");
        }
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
