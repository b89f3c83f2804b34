//! Scriptable in-memory device
//!
//! Records every command written to it, answers reads from a queue of canned
//! responses and reports poll readiness only when a test signals it.
//!
//! Like the driver, readiness is shared by every poller on the node: a
//! signalled bit stays pending until a poller that asked for it wakes up.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::node::lock;
use crate::{CharDevice, EventMask, Result};

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<String>,
    responses: VecDeque<Vec<u8>>,
    fallback: Vec<u8>,
}

/// In-memory [`CharDevice`]
#[derive(Debug)]
pub struct MockDevice {
    path: PathBuf,
    state: Mutex<MockState>,
    ready: Mutex<VecDeque<EventMask>>,
    wake: Condvar,
    polls: AtomicUsize,
}

impl MockDevice {
    /// Create a mock node that pretends to live at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(MockState::default()),
            ready: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            polls: AtomicUsize::new(0),
        }
    }

    /// Queue a response for the next read
    pub fn push_response(&self, bytes: impl Into<Vec<u8>>) {
        lock(&self.state).responses.push_back(bytes.into());
    }

    /// Response served once the queue is empty (default: nothing)
    pub fn set_fallback_response(&self, bytes: impl Into<Vec<u8>>) {
        lock(&self.state).fallback = bytes.into();
    }

    /// Make `mask` ready for the pollers waiting on its bits
    pub fn signal(&self, mask: EventMask) {
        lock(&self.ready).push_back(mask);
        self.wake.notify_all();
    }

    /// Take the bits of the oldest pending event that `wanted` covers
    fn take_ready(pending: &mut VecDeque<EventMask>, wanted: EventMask) -> Option<EventMask> {
        let index = pending.iter().position(|ready| ready.intersects(wanted))?;
        let taken = pending[index] & wanted;
        pending[index].remove(taken);
        if pending[index].is_empty() {
            pending.remove(index);
        }
        Some(taken)
    }

    /// Every command written so far, in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    /// The most recent command
    pub fn last_command(&self) -> Option<String> {
        lock(&self.state).commands.last().cloned()
    }

    /// Forget recorded commands
    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }

    /// Number of poll calls that returned
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl CharDevice for MockDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, bytes: &[u8]) -> Result<usize> {
        lock(&self.state)
            .commands
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(bytes.len())
    }

    fn read(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        let mut response = match state.responses.pop_front() {
            Some(response) => response,
            None => state.fallback.clone(),
        };
        response.truncate(max_bytes);
        Ok(response)
    }

    fn poll(&self, mask: EventMask, timeout: Option<Duration>) -> Result<EventMask> {
        let wanted = mask | EventMask::ALWAYS_REPORTED;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = lock(&self.ready);

        let ready = loop {
            if let Some(ready) = Self::take_ready(&mut pending, wanted) {
                break ready;
            }

            match deadline {
                None => {
                    pending = self.wake.wait(pending).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break EventMask::empty();
                    }
                    pending = self
                        .wake
                        .wait_timeout(pending, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        };

        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(ready)
    }
}
