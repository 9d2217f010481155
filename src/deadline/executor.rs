use crate::deadline::interrupt;
use crate::error::{LockError, TimeoutError};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long an interrupted worker gets to hand back what it was doing.
const INTERRUPT_GRACE: Duration = Duration::from_millis(100);

/// Pause between interrupts while the worker has not answered.
const INTERRUPT_RETRY: Duration = Duration::from_millis(1);

/// Runs work under a wall-clock deadline.
///
/// The work runs on its own thread while the caller waits for it on a
/// rendezvous channel. If the deadline passes first the caller gets
/// [`TimeoutError`] back and the worker is interrupted and abandoned; whatever
/// it eventually returns is dropped, so a guard it returns late cleans up
/// after itself.
///
/// Each executor holds at most one deadline at a time. Calling
/// [`run`](Self::run) while another call on the same executor is still in
/// flight is a usage error ([`LockError::Scheduling`]), not contention.
#[derive(Debug)]
pub struct DeadlineExecutor {
    timeout: Duration,
    scheduled: AtomicBool,
}

impl DeadlineExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scheduled: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a deadline of this executor is currently outstanding.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Run `work`, returning its outcome unchanged if it finishes in time.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if the deadline fired first, even if the work
    ///   later fails with an error of its own
    /// - [`LockError::Scheduling`] if this executor already has a deadline
    ///   outstanding
    /// - whatever error `work` returned
    ///
    /// A panic inside `work` is resumed on the calling thread.
    pub fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<LockError> + Send + 'static,
    {
        let _deadline = self.schedule()?;
        let _handler = interrupt::install().map_err(LockError::from)?;

        let (tx, rx) = mpsc::sync_channel(0);
        let worker = thread::Builder::new()
            .name("interlock-deadline".to_string())
            .spawn(move || {
                if tx.send(work()).is_err() {
                    debug!("Deadline worker finished after its deadline, result dropped");
                }
            })
            .map_err(LockError::from)?;

        match rx.recv_timeout(self.timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                abandon(&worker, &rx);
                drop(rx);

                debug!("Deadline of {:?} exceeded, worker abandoned", self.timeout);
                Err(LockError::from(TimeoutError::new(self.timeout)).into())
            }
            Err(RecvTimeoutError::Disconnected) => match worker.join() {
                Err(payload) => panic::resume_unwind(payload),
                Ok(()) => Err(LockError::Other(
                    "Deadline worker exited without a result".to_string(),
                )
                .into()),
            },
        }
    }

    fn schedule(&self) -> Result<ScheduledDeadline<'_>, LockError> {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LockError::Scheduling {
                duration: self.timeout,
            });
        }

        Ok(ScheduledDeadline {
            scheduled: &self.scheduled,
        })
    }
}

/// Interrupt `worker` until it answers or the grace period is over.
///
/// A signal that lands before the worker enters its blocking call is
/// swallowed, so one interrupt is not enough.
fn abandon<T, R>(worker: &thread::JoinHandle<T>, rx: &mpsc::Receiver<R>) {
    let start = Instant::now();

    while start.elapsed() < INTERRUPT_GRACE {
        interrupt::interrupt(worker);
        match rx.recv_timeout(INTERRUPT_RETRY) {
            Ok(_) => {
                debug!("Deadline worker was interrupted, result dropped");
                return;
            }
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    debug!(
        "Deadline worker did not answer within {:?} of being interrupted",
        INTERRUPT_GRACE
    );
}

/// Clears the executor's deadline on every way out of `run`.
struct ScheduledDeadline<'a> {
    scheduled: &'a AtomicBool,
}

impl Drop for ScheduledDeadline<'_> {
    fn drop(&mut self) {
        self.scheduled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_cleared_after_inner_error() {
        let executor = DeadlineExecutor::new(Duration::from_secs(1));

        let result: Result<(), LockError> =
            executor.run(|| Err(LockError::Other("inner".to_string())));

        assert!(matches!(result, Err(LockError::Other(ref m)) if m == "inner"));
        assert!(!executor.is_scheduled());
    }

    #[test]
    fn test_deadline_cleared_after_panic() {
        let executor = DeadlineExecutor::new(Duration::from_secs(1));

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _: Result<(), LockError> = executor.run(|| panic!("boom"));
        }));

        assert!(result.is_err());
        assert!(!executor.is_scheduled());
    }
}
