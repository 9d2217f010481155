use crate::deadline::DeadlineExecutor;
use crate::error::{Result, TimeoutError};
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Something that can be locked exclusively, like an advisory file lock.
pub trait ExclusiveResource: Send + Sync {
    /// Try to take the lock without blocking; `Ok(false)` if someone else holds it.
    fn try_lock(&self) -> io::Result<bool>;

    /// Block until the lock is taken. May fail with `Interrupted`.
    fn lock(&self) -> io::Result<()>;

    fn unlock(&self) -> io::Result<()>;
}

/// Check if an I/O error indicates lock contention (file locked by another process)
fn is_lock_contention(e: &io::Error) -> bool {
    // Check for WouldBlock (Unix)
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    // Check for Windows-specific lock errors
    // ERROR_LOCK_VIOLATION (33) - file region is locked
    // ERROR_SHARING_VIOLATION (32) - file in use by another process
    #[cfg(windows)]
    if let Some(code) = e.raw_os_error() {
        if code == 33 || code == 32 {
            return true;
        }
    }
    false
}

impl ExclusiveResource for File {
    fn try_lock(&self) -> io::Result<bool> {
        match FileExt::try_lock_exclusive(self) {
            Ok(()) => Ok(true),
            Err(e) if is_lock_contention(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> io::Result<()> {
        FileExt::lock_exclusive(self)
    }

    fn unlock(&self) -> io::Result<()> {
        FileExt::unlock(self)
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
    pub poll_interval: Duration,
}

impl TimeoutConfig {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// How to wait for a resource somebody else has locked.
#[derive(Debug, Clone, Default)]
pub enum LockStrategy {
    /// Wait as long as it takes.
    #[default]
    Block,
    /// Poll without blocking until the deadline passes.
    Busy(TimeoutConfig),
    /// Block, but interrupt the wait once the deadline passes.
    Deadline(Duration),
}

impl LockStrategy {
    pub fn busy(duration: Duration) -> Self {
        LockStrategy::Busy(TimeoutConfig::new(duration))
    }

    pub fn deadline(duration: Duration) -> Self {
        LockStrategy::Deadline(duration)
    }

    /// The longest this strategy waits, `None` for [`LockStrategy::Block`].
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            LockStrategy::Block => None,
            LockStrategy::Busy(config) => Some(config.duration),
            LockStrategy::Deadline(duration) => Some(*duration),
        }
    }
}

/// An acquired [`ExclusiveResource`] lock.
///
/// [`release`](Self::release) reports unlock failures; dropping the guard
/// unlocks too but can only log them.
pub struct ResourceGuard<R: ExclusiveResource> {
    resource: Option<Arc<R>>,
}

impl<R: ExclusiveResource> ResourceGuard<R> {
    fn new(resource: Arc<R>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub fn release(mut self) -> io::Result<()> {
        match self.resource.take() {
            Some(resource) => resource.unlock(),
            None => Ok(()),
        }
    }
}

impl<R: ExclusiveResource> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            match resource.unlock() {
                Ok(()) => debug!("Lock released on drop"),
                Err(e) => warn!("Failed to release lock on drop (non-fatal): {}", e),
            }
        }
    }
}

/// Wait as long as it takes.
pub fn block<R: ExclusiveResource>(resource: &Arc<R>) -> Result<ResourceGuard<R>> {
    resource.lock()?;
    Ok(ResourceGuard::new(Arc::clone(resource)))
}

/// Poll `try_lock` with a fixed sleep until `config.duration` has passed.
pub fn busy<R: ExclusiveResource>(
    resource: &Arc<R>,
    config: &TimeoutConfig,
) -> Result<ResourceGuard<R>> {
    let start = Instant::now();

    loop {
        if resource.try_lock()? {
            return Ok(ResourceGuard::new(Arc::clone(resource)));
        }

        let remaining = config.duration.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(TimeoutError::new(config.duration).into());
        }

        thread::sleep(config.poll_interval.min(remaining));
    }
}

/// Block inside `executor`, which interrupts the wait at its deadline.
pub fn deadline_blocked<R: ExclusiveResource + 'static>(
    resource: &Arc<R>,
    executor: &DeadlineExecutor,
) -> Result<ResourceGuard<R>> {
    let resource = Arc::clone(resource);
    executor.run(move || {
        resource.lock()?;
        Ok(ResourceGuard::new(resource))
    })
}
