use crate::error::LockError;
use crate::mutex::Mutex;

/// Double-checked locking.
///
/// The check runs once without the lock. Only if it passes is the lock
/// acquired, and the check runs again inside the critical section before
/// the code does. Built with [`Mutex::check`].
///
/// ```
/// use interlock::{Mutex, NoMutex};
/// use std::cell::Cell;
///
/// let mutex = NoMutex;
/// let stock = Cell::new(3);
///
/// let sold = mutex
///     .check(|| stock.get() > 0)
///     .then(|| -> interlock::Result<u32> {
///         stock.set(stock.get() - 1);
///         Ok(stock.get())
///     })
///     .unwrap();
///
/// assert_eq!(sold, Some(2));
/// ```
pub struct DoubleCheck<'a, M, P> {
    mutex: &'a M,
    check: P,
}

impl<'a, M, P> DoubleCheck<'a, M, P>
where
    M: Mutex,
    P: FnMut() -> bool,
{
    pub(crate) fn new(mutex: &'a M, check: P) -> Self {
        Self { mutex, check }
    }

    /// Run `code` under the lock if the check holds before and after locking.
    ///
    /// Returns `Ok(None)` when either check fails; the lock is not taken at
    /// all when the first one does.
    pub fn then<T, E, F>(mut self, code: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: Send + 'static,
        E: From<LockError>,
    {
        if !(self.check)() {
            return Ok(None);
        }

        let check = &mut self.check;
        self.mutex.synchronized(move || {
            if !check() {
                return Ok(None);
            }
            code().map(Some)
        })
    }
}
