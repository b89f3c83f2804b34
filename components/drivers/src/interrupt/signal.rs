//! Signal-driven interrupt delivery
//!
//! The signal variant of the bbgpio driver queues `SIGIO` to the registered
//! process (`SI_QUEUE`) and puts the source id in `si_int`. The source id is
//! the GPIO line number, which is unique across the whole process. One
//! handler serves every source: it records the id in a pending set and wakes
//! a dispatcher thread through a self-pipe. The dispatcher looks the id up in
//! a registry and runs the callback outside of signal context.
//!
//! `SIGIO` raised any other way (`kill`, `O_ASYNC` descriptors) is ignored.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::FromRawFd;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::{mem, ptr, thread};

use log::{debug, error, info};
use static_assertions::const_assert;

use super::Callback;
use crate::{DriverError, Result};

/// Exclusive upper bound of source ids (GPIO lines go up to 117)
pub const MAX_SOURCES: u32 = 128;

const_assert!(MAX_SOURCES % u64::BITS == 0);

const PENDING_WORDS: usize = (MAX_SOURCES / u64::BITS) as usize;

/// Source ids seen by the handler and not yet dispatched, 64 per word
static PENDING: [AtomicU64; PENDING_WORDS] = [AtomicU64::new(0), AtomicU64::new(0)];

/// Write end of the self-pipe, -1 until the dispatcher starts
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

fn mark_pending(id: u32) {
    if id < MAX_SOURCES {
        PENDING[(id / u64::BITS) as usize].fetch_or(1 << (id % u64::BITS), Ordering::SeqCst);
    }
}

/// Drain the pending set, lowest id first
fn take_pending() -> Vec<u32> {
    let mut ids = Vec::new();
    for (word, pending) in PENDING.iter().enumerate() {
        let mut bits = pending.swap(0, Ordering::SeqCst);
        while bits != 0 {
            ids.push(word as u32 * u64::BITS + bits.trailing_zeros());
            bits &= bits - 1;
        }
    }
    ids
}

extern "C" fn on_sigio(_signum: libc::c_int, info: *mut libc::siginfo_t, _context: *mut libc::c_void) {
    // Async-signal-safe work only: atomics and write(2)
    if info.is_null() {
        return;
    }
    // SAFETY: the kernel hands SA_SIGINFO handlers a valid siginfo_t
    let (code, value) = unsafe { ((*info).si_code, (*info).si_value()) };
    if code != libc::SI_QUEUE {
        return;
    }

    // si_int shares storage with the low half of sival_ptr
    mark_pending(value.sival_ptr as usize as u32);

    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

type SharedCallback = Arc<Mutex<Callback>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide registry of signal-delivered interrupt callbacks
///
/// Any number of sources can be registered at once; each is keyed by its
/// source id (the interrupt's GPIO line), and an id holds one callback.
pub struct SignalDispatcher {
    callbacks: Mutex<HashMap<u32, SharedCallback>>,
    started: Mutex<bool>,
}

impl SignalDispatcher {
    fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
            started: Mutex::new(false),
        }
    }

    /// The dispatcher for this process
    pub fn global() -> &'static SignalDispatcher {
        static GLOBAL: OnceLock<SignalDispatcher> = OnceLock::new();
        GLOBAL.get_or_init(SignalDispatcher::new)
    }

    /// Register `callback` for source `id` on behalf of `pin`
    ///
    /// Installs the `SIGIO` handler and starts the dispatcher thread on the
    /// first registration.
    ///
    /// # Errors
    /// - `InvalidArgument` if `id` is not below [`MAX_SOURCES`]
    /// - `AlreadyAttached` if another callback holds `id`
    /// - `Spawn` if the handler or dispatcher cannot be set up
    pub fn register(&'static self, id: u32, pin: &'static str, callback: Callback) -> Result<()> {
        if id >= MAX_SOURCES {
            return Err(DriverError::InvalidArgument(format!(
                "signal source id {id} is out of range"
            )));
        }
        self.ensure_started()?;
        if !self.insert(id, callback) {
            return Err(DriverError::AlreadyAttached { pin });
        }
        Ok(())
    }

    /// Remove the callback for source `id`
    ///
    /// # Returns
    /// `true` if a callback was registered
    pub fn unregister(&self, id: u32) -> bool {
        lock(&self.callbacks).remove(&id).is_some()
    }

    pub fn is_registered(&self, id: u32) -> bool {
        lock(&self.callbacks).contains_key(&id)
    }

    /// Number of registered sources
    pub fn registered(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Insert `callback` unless `id` is taken
    fn insert(&self, id: u32, callback: Callback) -> bool {
        match lock(&self.callbacks).entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(callback)));
                true
            }
        }
    }

    /// Run the callbacks for every id in `ids`
    ///
    /// # Returns
    /// Number of callbacks invoked
    fn dispatch(&self, ids: impl IntoIterator<Item = u32>) -> usize {
        let mut invoked = 0;

        for id in ids {
            // Clone out of the registry so callbacks may (un)register
            let callback = lock(&self.callbacks).get(&id).cloned();
            match callback {
                Some(shared) => {
                    let mut callback = lock(&*shared);
                    (*callback)();
                    invoked += 1;
                }
                None => debug!("SIGIO for unregistered source {}", id),
            }
        }

        invoked
    }

    fn ensure_started(&'static self) -> Result<()> {
        let mut started = lock(&self.started);
        if *started {
            return Ok(());
        }

        let setup_error = |source: io::Error| DriverError::Spawn {
            name: "SIGIO dispatcher".to_string(),
            source,
        };

        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: fds has room for the two descriptors
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(setup_error(io::Error::last_os_error()));
        }
        // SAFETY: pipe2 just returned this descriptor and nothing else owns it
        let reader = unsafe { File::from_raw_fd(fds[0]) };

        thread::Builder::new()
            .name("irq-sigio".to_string())
            .spawn(move || self.run(reader))
            .map_err(setup_error)?;

        WAKE_FD.store(fds[1], Ordering::SeqCst);

        // SAFETY: the action is fully initialised and the handler only does
        // async-signal-safe work
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = on_sigio as *const () as libc::sighandler_t;
            action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGIO, &action, ptr::null_mut()) != 0 {
                return Err(setup_error(io::Error::last_os_error()));
            }
        }

        *started = true;
        info!("SIGIO interrupt dispatcher started");
        Ok(())
    }

    fn run(&self, mut reader: File) {
        let mut buf = [0u8; 64];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    self.dispatch(take_pending());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("SIGIO dispatcher stopped: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(dispatcher: &SignalDispatcher, id: u32) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        assert!(dispatcher.insert(
            id,
            Box::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        count
    }

    #[test]
    fn test_dispatch_by_source_id() {
        let dispatcher = SignalDispatcher::new();
        let first = counter(&dispatcher, 22);
        let second = counter(&dispatcher, 60);

        assert_eq!(dispatcher.dispatch([60]), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert_eq!(dispatcher.dispatch([22, 60]), 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregistered_sources_are_dropped() {
        let dispatcher = SignalDispatcher::new();
        let count = counter(&dispatcher, 2);

        assert_eq!(dispatcher.dispatch([9]), 0);
        assert!(dispatcher.unregister(2));
        assert!(!dispatcher.unregister(2));
        assert_eq!(dispatcher.dispatch([2]), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_taken_id_is_not_replaced() {
        let dispatcher = SignalDispatcher::new();
        let first = counter(&dispatcher, 60);

        assert!(!dispatcher.insert(60, Box::new(|| panic!("replaced callback ran"))));
        assert_eq!(dispatcher.registered(), 1);

        dispatcher.dispatch([60]);
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_many_sources_registered_at_once() {
        let dispatcher = SignalDispatcher::new();
        let counts: Vec<_> = [5, 63, 64, 117].into_iter().map(|id| counter(&dispatcher, id)).collect();
        assert_eq!(dispatcher.registered(), 4);

        dispatcher.dispatch([5, 63, 64, 117]);
        for count in counts {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_pending_set_spans_all_lines() {
        take_pending();
        for id in [117, 0, 64, 63, MAX_SOURCES] {
            mark_pending(id);
        }
        assert_eq!(take_pending(), vec![0, 63, 64, 117]);
        assert!(take_pending().is_empty());
    }

    #[test]
    fn test_out_of_range_id_rejected() {
        let result = SignalDispatcher::global().register(MAX_SOURCES, "P9_12", Box::new(|| {}));
        assert!(matches!(result, Err(DriverError::InvalidArgument(_))));
    }
}
