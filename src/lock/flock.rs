use crate::deadline::DeadlineExecutor;
use crate::error::{LockError, Result};
use crate::lock::acquisition::{self, ExclusiveResource, LockStrategy, ResourceGuard};
use crate::lock::path::derive_lock_path;
use crate::mutex::Mutex;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A mutex backed by one exclusively lockable resource, by default an
/// advisory lock on a file.
///
/// All clones of the underlying file handle share one lock, so a single
/// `FlockMutex` excludes other processes (and other `FlockMutex` values
/// opened on the same path), not concurrent callers of the same instance.
pub struct FlockMutex<R: ExclusiveResource = File> {
    resource: Arc<R>,
    name: String,
    strategy: LockStrategy,
    executor: Option<DeadlineExecutor>,
}

impl FlockMutex<File> {
    pub fn new(file: File) -> Self {
        Self::from_resource(file, "file")
    }

    /// Open (creating if needed) the lock file at `lock_path`
    pub fn open(lock_path: &Path) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.create(true).write(true).truncate(false);

        // On Unix, use O_NOFOLLOW to reject symlinks at OS level
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_NOFOLLOW);
        }

        let file = opts.open(lock_path).map_err(|e| {
            LockError::Other(format!(
                "Failed to create lock file {}: {}",
                lock_path.display(),
                e
            ))
        })?;

        Ok(Self::from_resource(file, lock_path.display().to_string()))
    }

    /// Open the lock file for `name` in the lock cache directory
    pub fn named(name: &str) -> Result<Self> {
        let lock_path = derive_lock_path(name)?;
        let mut mutex = Self::open(&lock_path)?;
        mutex.name = name.to_string();
        Ok(mutex)
    }
}

impl<R: ExclusiveResource + 'static> FlockMutex<R> {
    pub fn from_resource(resource: R, name: impl Into<String>) -> Self {
        Self {
            resource: Arc::new(resource),
            name: name.into(),
            strategy: LockStrategy::Block,
            executor: None,
        }
    }

    pub fn with_strategy(mut self, strategy: LockStrategy) -> Self {
        self.executor = match &strategy {
            LockStrategy::Deadline(duration) => Some(DeadlineExecutor::new(*duration)),
            _ => None,
        };
        self.strategy = strategy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &LockStrategy {
        &self.strategy
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }
}

impl<R: ExclusiveResource + 'static> Mutex for FlockMutex<R> {
    type Guard = ResourceGuard<R>;

    fn acquire(&self) -> Result<Self::Guard> {
        debug!("Acquiring lock: {} (strategy: {:?})", self.name, self.strategy);

        let acquired = match (&self.strategy, &self.executor) {
            (LockStrategy::Block, _) => acquisition::block(&self.resource),
            (LockStrategy::Busy(config), _) => acquisition::busy(&self.resource, config),
            (LockStrategy::Deadline(_), Some(executor)) => {
                acquisition::deadline_blocked(&self.resource, executor)
            }
            (LockStrategy::Deadline(duration), None) => {
                acquisition::deadline_blocked(&self.resource, &DeadlineExecutor::new(*duration))
            }
        };

        let guard = acquired.map_err(|e| match e {
            LockError::Timeout(timeout) => LockError::AcquireTimedOut {
                name: self.name.clone(),
                source: timeout,
            },
            LockError::Io(source) => LockError::AcquireFailed {
                name: self.name.clone(),
                source,
            },
            other => other,
        })?;

        debug!("Lock acquired: {}", self.name);
        Ok(guard)
    }

    fn release(&self, guard: Self::Guard) -> Result<()> {
        guard
            .release()
            .map_err(|e| LockError::release(self.name.clone(), e.to_string()))?;

        debug!("Lock released: {}", self.name);
        Ok(())
    }
}
