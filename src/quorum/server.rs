use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The server could not be reached or did not answer in time. Counts as
    /// "not acquired" for that server.
    #[error("server unavailable: {0}")]
    Unavailable(String),

    /// The server understood the request and refused it (malformed command,
    /// wrong configuration). Retrying will not help.
    #[error("command rejected: {0}")]
    Command(String),
}

/// One lock server of a quorum.
///
/// Both operations must be atomic with respect to concurrent callers.
pub trait LockServer: Send + Sync {
    /// Store `key = value` expiring after `ttl`, only if `key` holds no
    /// unexpired value. `Ok(true)` if this call stored it.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, ServerError>;

    /// Delete `key` only if it currently holds `expected`. `Ok(true)` if this
    /// call deleted it.
    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ServerError>;
}
