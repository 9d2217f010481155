//! Deadline-bounded execution of blocking work.
//!
//! [`DeadlineExecutor`] runs a closure on a worker thread and gives up on it
//! once its deadline passes. On unix the abandoned worker is also sent a
//! signal, so a blocking `flock(2)` it is stuck in returns `EINTR`.

mod executor;
mod interrupt;

pub use executor::DeadlineExecutor;
