//! Mutexes for critical sections shared between threads, processes and
//! machines.
//!
//! Every mutex implements [`Mutex`]: [`FlockMutex`] holds an advisory file
//! lock and can bound its wait with a deadline, [`QuorumMutex`] holds a lease
//! on a majority of independent lock servers.
//!
//! ```no_run
//! use interlock::{FlockMutex, LockStrategy, Mutex};
//! use std::time::Duration;
//!
//! let mutex = FlockMutex::named("nightly-report")?
//!     .with_strategy(LockStrategy::deadline(Duration::from_secs(5)));
//!
//! let rows = mutex.synchronized(|| -> interlock::Result<usize> {
//!     // only one process at a time gets here
//!     Ok(42)
//! })?;
//! # Ok::<(), interlock::LockError>(())
//! ```

pub mod deadline;
pub mod error;
pub mod lock;
pub mod mutex;
pub mod quorum;
pub mod utils;

pub use deadline::DeadlineExecutor;
pub use error::{LockError, Result, TimeoutError};
pub use lock::{ExclusiveResource, FlockMutex, LockStrategy, TimeoutConfig};
pub use mutex::{DoubleCheck, Mutex, NoMutex};
pub use quorum::{LockServer, MemoryLockServer, OwnershipToken, QuorumConfig, QuorumMutex, ServerError};
