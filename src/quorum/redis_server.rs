//! Redis lock server
//!
//! Leases are plain keys written with `SET key token NX PX ttl`. Release goes
//! through a Lua script so the token comparison and the delete happen
//! atomically on the server.
//!
//! ## Example
//!
//! ```ignore
//! use interlock::quorum::{QuorumMutex, RedisLockServer};
//! use std::sync::Arc;
//!
//! let servers = ["redis://10.0.0.1", "redis://10.0.0.2", "redis://10.0.0.3"]
//!     .iter()
//!     .map(|url| Ok(Arc::new(RedisLockServer::new(url)?) as _))
//!     .collect::<interlock::Result<Vec<_>>>()?;
//! let mutex = QuorumMutex::new(servers, "nightly-report");
//! ```

use crate::error::{LockError, Result};
use crate::quorum::server::{LockServer, ServerError};
use redis::{Client, Connection, RedisError, Script};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// A single Redis server taking part in a quorum.
///
/// Keeps one connection and reconnects after I/O failures.
pub struct RedisLockServer {
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
    release_script: Script,
}

impl RedisLockServer {
    /// Create a lock server for a Redis URL (e.g. "redis://localhost:6379")
    ///
    /// No connection is made until the first lock operation.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| LockError::Other(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            timeout: Duration::from_millis(50),
            connection: Mutex::new(None),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Connect, read and write timeout for every operation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect(&self) -> std::result::Result<Connection, RedisError> {
        let connection = self.client.get_connection_with_timeout(self.timeout)?;
        connection.set_read_timeout(Some(self.timeout))?;
        connection.set_write_timeout(Some(self.timeout))?;
        Ok(connection)
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> std::result::Result<T, RedisError>,
    ) -> std::result::Result<T, ServerError> {
        let mut slot = self.connection.lock().unwrap_or_else(|e| e.into_inner());

        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => self.connect().map_err(classify)?,
        };

        match op(&mut connection) {
            Ok(value) => {
                *slot = Some(connection);
                Ok(value)
            }
            Err(e) => {
                if is_unavailable(&e) {
                    debug!("Dropping Redis connection after error: {}", e);
                } else {
                    *slot = Some(connection);
                }
                Err(classify(e))
            }
        }
    }
}

fn is_unavailable(e: &RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn classify(e: RedisError) -> ServerError {
    if is_unavailable(&e) {
        ServerError::Unavailable(e.to_string())
    } else {
        ServerError::Command(e.to_string())
    }
}

impl LockServer for RedisLockServer {
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> std::result::Result<bool, ServerError> {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        self.with_connection(|connection| {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis)
                .query(connection)?;
            Ok(reply.is_some())
        })
    }

    fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> std::result::Result<bool, ServerError> {
        self.with_connection(|connection| {
            let deleted: i64 = self
                .release_script
                .key(key)
                .arg(expected)
                .invoke(connection)?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1
    const REFUSING_URL: &str = "redis://127.0.0.1:1";

    #[test]
    fn test_refused_connection_is_unavailable() {
        let server = RedisLockServer::new(REFUSING_URL).unwrap();

        assert!(matches!(
            server.set_if_absent("lock_jobs", "token", Duration::from_secs(4)),
            Err(ServerError::Unavailable(_))
        ));
        assert!(matches!(
            server.compare_and_delete("lock_jobs", "token"),
            Err(ServerError::Unavailable(_))
        ));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(RedisLockServer::new("not a url").is_err());
    }

    #[test]
    fn test_refusing_minority_does_not_block_quorum() {
        use crate::mutex::Mutex;
        use crate::quorum::{MemoryLockServer, QuorumMutex};
        use std::sync::Arc;

        let servers: Vec<Arc<dyn LockServer>> = vec![
            Arc::new(MemoryLockServer::new()),
            Arc::new(RedisLockServer::new(REFUSING_URL).unwrap()),
            Arc::new(MemoryLockServer::new()),
        ];
        let mutex = QuorumMutex::new(servers, "jobs");

        let result: crate::Result<u8> = mutex.synchronized(|| Ok(5));
        assert_eq!(result.unwrap(), 5);
    }
}
