//! A lock held across a majority of independent lock servers.
//!
//! [`QuorumMutex`] writes a lease with a fresh random token to every server
//! and counts itself the holder only when a majority accepted it and enough
//! of the lease's lifetime is left once elapsed time and clock drift are
//! subtracted. Releasing deletes the lease only where it still carries that
//! token.

mod config;
mod memory;
mod mutex;
#[cfg(feature = "redis")]
mod redis_server;
mod server;
mod token;

pub use config::QuorumConfig;
pub use memory::MemoryLockServer;
pub use mutex::{QuorumLease, QuorumMutex};
#[cfg(feature = "redis")]
pub use redis_server::RedisLockServer;
pub use server::{LockServer, ServerError};
pub use token::OwnershipToken;
