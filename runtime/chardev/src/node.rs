//! Descriptor strategies for device nodes

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, info};

use crate::{CharDevice, DeviceError, EventMask, Result};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_with(path: &Path, options: &OpenOptions) -> Result<File> {
    options
        .open(path)
        .map_err(|e| DeviceError::unavailable(path, e))
}

/// Block in `poll(2)` on `file` until `mask` is satisfied or `timeout` expires
fn poll_file(file: &File, path: &Path, mask: EventMask, timeout: Option<Duration>) -> Result<EventMask> {
    let timeout_ms = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: mask.bits() as libc::c_short,
        revents: 0,
    };

    loop {
        // SAFETY: pfd is a valid pollfd and nfds is 1
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // SIGIO delivery interrupts pollers in the same process
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(DeviceError::io(path, err));
        }
        if rc == 0 {
            return Ok(EventMask::empty());
        }
        return Ok(EventMask::from_bits_retain(pfd.revents as u16));
    }
}

fn read_at_start(file: &File, path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; max_bytes];
    let n = file
        .read_at(&mut buf, 0)
        .map_err(|e| DeviceError::io(path, e))?;
    buf.truncate(n);
    Ok(buf)
}

/// Device node opened and closed around every operation
///
/// Nothing is shared between calls, so two wrappers on the same node never
/// see each other's descriptor. Every command pays for an `open`/`close`.
#[derive(Debug, Clone)]
pub struct TransientNode {
    path: PathBuf,
}

impl TransientNode {
    /// Create a node handle for `path`
    ///
    /// The node is not touched until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CharDevice for TransientNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut file = open_with(&self.path, OpenOptions::new().write(true))?;
        debug!("{}: write {:?}", self.path.display(), String::from_utf8_lossy(bytes));
        file.write(bytes).map_err(|e| DeviceError::io(&self.path, e))
    }

    fn read(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut file = open_with(&self.path, OpenOptions::new().read(true))?;
        let mut buf = vec![0u8; max_bytes];
        let n = file
            .read(&mut buf)
            .map_err(|e| DeviceError::io(&self.path, e))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn poll(&self, mask: EventMask, timeout: Option<Duration>) -> Result<EventMask> {
        let file = open_with(&self.path, OpenOptions::new().read(true))?;
        poll_file(&file, &self.path, mask, timeout)
    }
}

/// Device node held open for the lifetime of the process
///
/// The bbgpio driver refuses a second concurrent `open`, so every wrapper of
/// one device class has to go through the same descriptor. Commands take
/// the I/O mutex; `poll` only clones the descriptor and blocks without it.
#[derive(Debug)]
pub struct SharedNode {
    path: PathBuf,
    file: RwLock<Option<Arc<File>>>,
    io: Mutex<()>,
}

impl SharedNode {
    /// Open `path` read-write and hold the descriptor
    ///
    /// # Errors
    /// Returns `Unavailable` if the node is missing or permission is denied
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_with(&path, OpenOptions::new().read(true).write(true))?;
        info!("Opened shared device {}", path.display());
        Ok(Self {
            path,
            file: RwLock::new(Some(Arc::new(file))),
            io: Mutex::new(()),
        })
    }

    /// Whether the descriptor is still held
    pub fn is_open(&self) -> bool {
        self.file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Close the descriptor
    ///
    /// Later operations fail with `Closed`. A poller already blocked keeps
    /// its own reference and releases it when it wakes up.
    pub fn shutdown(&self) {
        let _guard = lock(&self.io);
        let mut file = self.file.write().unwrap_or_else(PoisonError::into_inner);
        if file.take().is_some() {
            info!("Closed shared device {}", self.path.display());
        }
    }

    fn handle(&self) -> Result<Arc<File>> {
        self.file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| DeviceError::Closed {
                path: self.path.clone(),
            })
    }

    fn write_locked(&self, file: &File, bytes: &[u8]) -> Result<usize> {
        debug!("{}: write {:?}", self.path.display(), String::from_utf8_lossy(bytes));
        let mut writer = file;
        writer.write(bytes).map_err(|e| DeviceError::io(&self.path, e))
    }
}

impl CharDevice for SharedNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, bytes: &[u8]) -> Result<usize> {
        let _guard = lock(&self.io);
        let file = self.handle()?;
        self.write_locked(&file, bytes)
    }

    // Positional reads at offset 0: the driver tracks a per-open offset that
    // would otherwise run past the response after the first read.
    fn read(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let _guard = lock(&self.io);
        let file = self.handle()?;
        read_at_start(&file, &self.path, max_bytes)
    }

    fn transact(&self, command: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
        let _guard = lock(&self.io);
        let file = self.handle()?;
        self.write_locked(&file, command)?;
        read_at_start(&file, &self.path, max_bytes)
    }

    fn poll(&self, mask: EventMask, timeout: Option<Duration>) -> Result<EventMask> {
        let file = self.handle()?;
        poll_file(&file, &self.path, mask, timeout)
    }
}
