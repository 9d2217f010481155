//! The contract every mutex in this crate implements.
//!
//! A [`Mutex`] knows how to acquire and release one lock. Callers normally
//! go through [`Mutex::synchronized`], which guarantees the release on every
//! way out of the critical section, or [`Mutex::check`] for double-checked
//! locking.

mod double_check;
mod no_mutex;

pub use double_check::DoubleCheck;
pub use no_mutex::NoMutex;

use crate::error::{CodeResult, LockError, Result};
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

pub trait Mutex {
    /// Proof of acquisition, handed back to [`release`](Self::release).
    type Guard;

    fn acquire(&self) -> Result<Self::Guard>;

    fn release(&self, guard: Self::Guard) -> Result<()>;

    /// Run `code` while holding the lock and return what it returned.
    ///
    /// The lock is released whether `code` succeeds, fails or panics. If
    /// acquiring fails, `code` is not run.
    ///
    /// # Errors
    ///
    /// - an acquisition error (a timeout is wrapped, see
    ///   [`LockError::is_timeout`]) if the lock could not be taken
    /// - the error `code` returned, even if releasing failed as well; the
    ///   release failure is then only logged
    /// - a release error if `code` succeeded but releasing failed; the value
    ///   `code` returned travels with it ([`LockError::take_code_result`])
    fn synchronized<T, E, F>(&self, code: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        T: Send + 'static,
        E: From<LockError>,
    {
        let guard = self.acquire()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(code));
        let released = self.release(guard);

        match outcome {
            Err(payload) => {
                if let Err(e) = released {
                    error!("Critical section panicked and the lock release failed: {}", e);
                }
                panic::resume_unwind(payload)
            }
            Ok(Ok(value)) => match released {
                Ok(()) => Ok(value),
                Err(e) => Err(e.with_code_result(CodeResult::new(value)).into()),
            },
            Ok(Err(err)) => {
                if let Err(e) = released {
                    error!("Critical section failed and the lock release failed too: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Start a double-checked locking block, see [`DoubleCheck`].
    fn check<P>(&self, check: P) -> DoubleCheck<'_, Self, P>
    where
        Self: Sized,
        P: FnMut() -> bool,
    {
        DoubleCheck::new(self, check)
    }
}
