use crate::error::{LockError, Result, TimeoutError};
use crate::mutex::Mutex;
use crate::quorum::config::QuorumConfig;
use crate::quorum::server::{LockServer, ServerError};
use crate::quorum::token::OwnershipToken;
use rand::Rng;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One server's answer in a round; `None` if it did not answer in time.
type Answer = Option<std::result::Result<bool, ServerError>>;

/// Proof that a [`QuorumMutex`] holds its lock.
#[derive(Debug)]
pub struct QuorumLease {
    token: OwnershipToken,
    started: Instant,
    valid_until: Instant,
}

impl QuorumLease {
    pub fn token(&self) -> &OwnershipToken {
        &self.token
    }

    /// How much longer the lease is verifiably valid.
    pub fn remaining(&self) -> Duration {
        self.valid_until.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.valid_until
    }
}

/// Outcome of deleting a lease on every server.
///
/// A server answering that it does not hold the token is neither a release
/// nor a failure: it may never have granted this lease in the first place.
#[derive(Debug, Default)]
struct ReleaseTally {
    released: usize,
    failures: Vec<String>,
}

/// A lock held across a majority of independent [`LockServer`]s.
///
/// Tolerates any minority of the servers failing. Per-acquisition state
/// lives in the returned [`QuorumLease`], so one instance can be shared
/// between threads.
pub struct QuorumMutex {
    servers: Vec<Arc<dyn LockServer>>,
    name: String,
    key: String,
    config: QuorumConfig,
}

impl QuorumMutex {
    pub fn new(servers: Vec<Arc<dyn LockServer>>, name: impl Into<String>) -> Self {
        Self::with_config(servers, name, QuorumConfig::default())
    }

    pub fn with_config(
        servers: Vec<Arc<dyn LockServer>>,
        name: impl Into<String>,
        config: QuorumConfig,
    ) -> Self {
        let name = name.into();
        let key = format!("{}{}", config.key_prefix, name);
        Self {
            servers,
            name,
            key,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key the leases are stored under on every server
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Servers that must hold a lease for the lock to be held
    pub fn quorum(&self) -> usize {
        self.servers.len() / 2 + 1
    }

    /// Run `op` against every server at once and collect the answers that
    /// arrive within `server_timeout`, indexed like `self.servers`.
    fn fan_out<F>(&self, op: F) -> Vec<Answer>
    where
        F: Fn(&dyn LockServer) -> std::result::Result<bool, ServerError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let (tx, rx) = mpsc::channel();
        let mut answers: Vec<Answer> = vec![None; self.servers.len()];
        let mut pending = 0;

        for (index, server) in self.servers.iter().enumerate() {
            let server = Arc::clone(server);
            let op = Arc::clone(&op);
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("interlock-server-{}", index))
                .spawn(move || {
                    let _ = tx.send((index, (*op)(server.as_ref())));
                });

            match spawned {
                Ok(_) => pending += 1,
                Err(e) => {
                    answers[index] = Some(Err(ServerError::Unavailable(format!(
                        "could not start server worker: {}",
                        e
                    ))))
                }
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.config.server_timeout;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, answer)) => {
                    answers[index] = Some(answer);
                    pending -= 1;
                }
                Err(_) => break,
            }
        }

        answers
    }

    /// One acquisition round: try to write the lease everywhere.
    ///
    /// Returns how many servers accepted and how many could not be reached.
    fn try_acquire(&self, token: &OwnershipToken) -> Result<(usize, usize)> {
        let key = self.key.clone();
        let value = token.to_string();
        let ttl = self.config.lease_ttl;
        let answers = self.fan_out(move |server| server.set_if_absent(&key, &value, ttl));

        let mut acquired = 0;
        let mut unavailable = 0;
        let mut rejected = None;

        for (index, answer) in answers.into_iter().enumerate() {
            match answer {
                Some(Ok(true)) => acquired += 1,
                Some(Ok(false)) => {}
                Some(Err(ServerError::Unavailable(message))) => {
                    unavailable += 1;
                    warn!(
                        key = %self.key,
                        token = %token,
                        index,
                        error = %message,
                        "Could not set {} = {} at server #{}",
                        self.key,
                        token,
                        index
                    );
                }
                None => {
                    unavailable += 1;
                    warn!(
                        key = %self.key,
                        token = %token,
                        index,
                        "Could not set {} = {} at server #{}: no answer within {:?}",
                        self.key,
                        token,
                        index,
                        self.config.server_timeout
                    );
                }
                Some(Err(ServerError::Command(message))) => {
                    rejected.get_or_insert((index, message));
                }
            }
        }

        if let Some((index, message)) = rejected {
            self.release_all(token);
            return Err(LockError::ServerCommand {
                name: self.name.clone(),
                index,
                message,
            });
        }

        Ok((acquired, unavailable))
    }

    /// Compare-and-delete the lease on every server, never stopping early.
    fn release_all(&self, token: &OwnershipToken) -> ReleaseTally {
        let key = self.key.clone();
        let expected = token.to_string();
        let answers = self.fan_out(move |server| server.compare_and_delete(&key, &expected));

        let mut tally = ReleaseTally::default();
        for (index, answer) in answers.into_iter().enumerate() {
            match answer {
                Some(Ok(true)) => tally.released += 1,
                Some(Ok(false)) => {
                    debug!(key = %self.key, index, "Server #{} does not hold the lease", index)
                }
                Some(Err(ServerError::Command(message))) => tally.failures.push(format!(
                    "server #{} rejected the command: {}",
                    index, message
                )),
                Some(Err(ServerError::Unavailable(message))) => {
                    warn!(
                        key = %self.key,
                        token = %token,
                        index,
                        error = %message,
                        "Could not unset {} = {} at server #{}",
                        self.key,
                        token,
                        index
                    );
                }
                None => {
                    warn!(
                        key = %self.key,
                        token = %token,
                        index,
                        "Could not unset {} = {} at server #{}: no answer within {:?}",
                        self.key,
                        token,
                        index,
                        self.config.server_timeout
                    );
                }
            }
        }
        tally
    }

    fn backoff(&self, remaining: Duration) -> Duration {
        let min = self.config.retry_min.as_millis() as u64;
        let max = (self.config.retry_max.as_millis() as u64).max(min);
        let delay = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
        delay.min(remaining)
    }
}

impl Mutex for QuorumMutex {
    type Guard = QuorumLease;

    fn acquire(&self) -> Result<QuorumLease> {
        if self.servers.is_empty() {
            return Err(LockError::Other(format!(
                "No lock servers configured for lock {}",
                self.name
            )));
        }

        let quorum = self.quorum();
        let begin = Instant::now();

        loop {
            let token = OwnershipToken::generate();
            let started = Instant::now();
            let (acquired, unavailable) = self.try_acquire(&token)?;

            if acquired >= quorum {
                if let Some(validity) = self.config.remaining_validity(started.elapsed()) {
                    debug!(
                        key = %self.key,
                        acquired,
                        "Lock acquired on {} of {} servers, valid for {:?}",
                        acquired,
                        self.servers.len(),
                        validity
                    );
                    return Ok(QuorumLease {
                        token,
                        started,
                        valid_until: started + self.config.lease_ttl - self.config.drift(),
                    });
                }
            }

            if acquired > 0 || unavailable > 0 {
                let tally = self.release_all(&token);
                debug!(
                    key = %self.key,
                    released = tally.released,
                    "Cleaned up partial acquisition ({} of {} needed)",
                    acquired,
                    quorum
                );
            }

            if self.config.fail_fast && unavailable > self.servers.len() - quorum {
                return Err(LockError::QuorumUnavailable {
                    name: self.name.clone(),
                    unavailable,
                    total: self.servers.len(),
                });
            }

            let remaining = self.config.timeout.saturating_sub(begin.elapsed());
            if remaining.is_zero() {
                return Err(LockError::QuorumNotReached {
                    name: self.name.clone(),
                    acquired,
                    required: quorum,
                    source: TimeoutError::new(self.config.timeout),
                });
            }

            thread::sleep(self.backoff(remaining));
        }
    }

    fn release(&self, lease: QuorumLease) -> Result<()> {
        let overran = lease.is_expired();
        let tally = self.release_all(&lease.token);

        if overran {
            return Err(LockError::ExecutionOutsideLock {
                name: self.name.clone(),
                elapsed: lease.started.elapsed(),
                validity: lease.valid_until.duration_since(lease.started),
                code_result: None,
            });
        }

        let quorum = self.quorum();
        if !tally.failures.is_empty() || tally.released < quorum {
            let mut reasons = tally.failures;
            if tally.released < quorum {
                reasons.push(format!(
                    "only {} servers confirmed the release, {} needed",
                    tally.released, quorum
                ));
            }
            return Err(LockError::release(self.name.clone(), reasons.join("; ")));
        }

        debug!(key = %self.key, "Lock released on {} servers", tally.released);
        Ok(())
    }
}
