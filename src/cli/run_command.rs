use crate::cli::{Args, StrategyArg};
use interlock::utils::parse_duration;
use interlock::{FlockMutex, LockError, LockStrategy, Mutex, Result};
use std::process::{Command, ExitStatus};
use std::time::Duration;
use tracing::{debug, info};

pub fn execute_run(args: Args) -> Result<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    #[cfg(feature = "redis")]
    {
        if !args.servers.is_empty() {
            if args.strategy.is_some() {
                return Err(LockError::Other(
                    "--strategy applies to file locks only; use --timeout with --server"
                        .to_string(),
                ));
            }
            let mutex = quorum_mutex(&args.name, &args.servers, timeout)?;
            return run_locked(&mutex, &args.command);
        }
    }

    let strategy = lock_strategy(args.strategy, timeout)?;

    let mutex = match &args.lock_file {
        Some(path) => FlockMutex::open(path)?,
        None => FlockMutex::named(&args.name)?,
    }
    .with_strategy(strategy);

    info!("Using lock {} ({})", args.name, mutex.name());
    run_locked(&mutex, &args.command)
}

/// Pick the file lock strategy from the flags
///
/// A timeout without a strategy means busy waiting; a strategy that needs a
/// timeout without one is an error, and so is a timeout on a blocking lock.
fn lock_strategy(strategy: Option<StrategyArg>, timeout: Option<Duration>) -> Result<LockStrategy> {
    match (strategy, timeout) {
        (None, None) | (Some(StrategyArg::Block), None) => Ok(LockStrategy::Block),
        (Some(StrategyArg::Block), Some(_)) => Err(LockError::Other(
            "--timeout cannot be used with --strategy block".to_string(),
        )),
        (None, Some(timeout)) | (Some(StrategyArg::Busy), Some(timeout)) => {
            Ok(LockStrategy::busy(timeout))
        }
        (Some(StrategyArg::Deadline), Some(timeout)) => Ok(LockStrategy::deadline(timeout)),
        (Some(strategy), None) => Err(LockError::Other(format!(
            "--strategy {} requires --timeout",
            match strategy {
                StrategyArg::Busy => "busy",
                _ => "deadline",
            }
        ))),
    }
}

#[cfg(feature = "redis")]
fn quorum_mutex(
    name: &str,
    urls: &[String],
    timeout: Option<Duration>,
) -> Result<interlock::QuorumMutex> {
    use interlock::quorum::RedisLockServer;
    use interlock::{LockServer, QuorumConfig};
    use std::sync::Arc;

    let config = timeout.map(QuorumConfig::new).unwrap_or_default();
    let servers = urls
        .iter()
        .map(|url| -> Result<Arc<dyn LockServer>> {
            let server = RedisLockServer::new(url)?.with_timeout(config.server_timeout);
            Ok(Arc::new(server) as Arc<dyn LockServer>)
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Using quorum lock {} over {} servers", name, servers.len());
    Ok(interlock::QuorumMutex::with_config(servers, name, config))
}

fn run_locked<M: Mutex>(mutex: &M, command: &[String]) -> Result<i32> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| LockError::Other("No command given".to_string()))?;

    mutex.synchronized(|| -> Result<i32> {
        debug!("Lock held, running: {}", command.join(" "));
        let status = Command::new(program).args(rest).status().map_err(|e| {
            LockError::Other(format!("Failed to run command '{}': {}", program, e))
        })?;
        Ok(exit_code(status))
    })
}

/// Exit code to report for the child, following the shell convention of
/// 128 + signal number for a child killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_alone_means_busy() {
        let strategy = lock_strategy(None, Some(Duration::from_secs(2))).unwrap();
        assert!(matches!(strategy, LockStrategy::Busy(ref c) if c.duration == Duration::from_secs(2)));
    }

    #[test]
    fn test_default_is_block() {
        assert!(matches!(lock_strategy(None, None).unwrap(), LockStrategy::Block));
    }

    #[test]
    fn test_deadline_requires_timeout() {
        assert!(lock_strategy(Some(StrategyArg::Deadline), None).is_err());
        assert!(lock_strategy(Some(StrategyArg::Busy), None).is_err());
        assert!(lock_strategy(Some(StrategyArg::Block), Some(Duration::from_secs(1))).is_err());
    }

    #[test]
    fn test_deadline_strategy() {
        let strategy =
            lock_strategy(Some(StrategyArg::Deadline), Some(Duration::from_millis(500))).unwrap();
        assert_eq!(strategy.timeout(), Some(Duration::from_millis(500)));
    }
}
