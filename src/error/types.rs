use std::any::Any;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// A deadline elapsed before the lock was acquired or the bounded work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Timeout of {duration:?} exceeded")]
pub struct TimeoutError {
    pub duration: Duration,
}

impl TimeoutError {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

/// The result of a critical section whose lock could not be released afterwards.
pub struct CodeResult(Box<dyn Any + Send>);

impl CodeResult {
    pub(crate) fn new<T: Send + 'static>(value: T) -> Self {
        CodeResult(Box::new(value))
    }

    /// Recover the value, or get `self` back if it is not a `T`.
    pub fn downcast<T: 'static>(self) -> std::result::Result<T, Self> {
        self.0.downcast::<T>().map(|v| *v).map_err(CodeResult)
    }
}

impl fmt::Debug for CodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeResult(..)")
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Deadline of {duration:?} is already scheduled on this executor")]
    Scheduling { duration: Duration },

    #[error("Failed to acquire lock {name}: {source}")]
    AcquireTimedOut { name: String, source: TimeoutError },

    #[error("Failed to acquire lock {name}: {source}")]
    AcquireFailed { name: String, source: io::Error },

    #[error(
        "Failed to acquire lock {name}: quorum not reached ({acquired} of {required} servers) before {source}"
    )]
    QuorumNotReached {
        name: String,
        acquired: usize,
        required: usize,
        source: TimeoutError,
    },

    #[error(
        "Failed to acquire lock {name}: {unavailable} of {total} servers are unavailable, quorum is impossible"
    )]
    QuorumUnavailable {
        name: String,
        unavailable: usize,
        total: usize,
    },

    #[error("Failed to acquire lock {name}: server #{index} rejected the command: {message}")]
    ServerCommand {
        name: String,
        index: usize,
        message: String,
    },

    #[error("Failed to release lock {name}: {message}")]
    Release {
        name: String,
        message: String,
        code_result: Option<CodeResult>,
    },

    #[error("Critical section of lock {name} took {elapsed:?}, the lease was only valid for {validity:?}")]
    ExecutionOutsideLock {
        name: String,
        elapsed: Duration,
        validity: Duration,
        code_result: Option<CodeResult>,
    },

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl LockError {
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::AcquireFailed { source, .. }
                if source.kind() == io::ErrorKind::Interrupted =>
            {
                3
            }
            LockError::Io(e) if e.kind() == io::ErrorKind::Interrupted => 3,
            e if e.is_timeout() || e.is_acquire_error() => 2,
            _ => 1,
        }
    }

    /// True when a deadline elapsing caused this error, directly or as the
    /// reason an acquisition failed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LockError::Timeout(_)
                | LockError::AcquireTimedOut { .. }
                | LockError::QuorumNotReached { .. }
        )
    }

    pub fn is_acquire_error(&self) -> bool {
        matches!(
            self,
            LockError::AcquireTimedOut { .. }
                | LockError::AcquireFailed { .. }
                | LockError::QuorumNotReached { .. }
                | LockError::QuorumUnavailable { .. }
                | LockError::ServerCommand { .. }
        )
    }

    /// True for failures after the critical section ran, including a
    /// critical section that outlived its lease.
    pub fn is_release_error(&self) -> bool {
        matches!(
            self,
            LockError::Release { .. } | LockError::ExecutionOutsideLock { .. }
        )
    }

    /// Take the critical section's result out of a release failure.
    ///
    /// Returns `None` for other errors, when the critical section did not
    /// produce a value, or when `T` is not the type it returned.
    pub fn take_code_result<T: 'static>(&mut self) -> Option<T> {
        let code_result = match self {
            LockError::Release { code_result, .. }
            | LockError::ExecutionOutsideLock { code_result, .. } => code_result,
            _ => return None,
        };
        match code_result.take()?.downcast::<T>() {
            Ok(value) => Some(value),
            Err(other) => {
                *code_result = Some(other);
                None
            }
        }
    }

    /// Attach the critical section's result to a release failure; other
    /// errors are returned unchanged and the value is dropped.
    pub(crate) fn with_code_result(mut self, value: CodeResult) -> Self {
        match &mut self {
            LockError::Release { code_result, .. }
            | LockError::ExecutionOutsideLock { code_result, .. } => *code_result = Some(value),
            _ => {}
        }
        self
    }

    pub(crate) fn release(name: impl Into<String>, message: impl Into<String>) -> Self {
        LockError::Release {
            name: name.into(),
            message: message.into(),
            code_result: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
