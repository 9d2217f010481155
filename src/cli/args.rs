use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "interlock",
    version,
    about = "Run a command while holding a lock shared with other processes",
    long_about = None
)]
pub struct Args {
    /// Lock name; every process using the same name contends for the same lock
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Command to run while the lock is held
    #[arg(value_name = "COMMAND", last = true, required = true)]
    pub command: Vec<String>,

    /// Custom lock file location (default: derived from NAME in the cache directory)
    #[arg(long, value_name = "PATH")]
    pub lock_file: Option<PathBuf>,

    /// How to wait while someone else holds the lock (default: block, or busy with --timeout)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Give up waiting for the lock after DURATION (e.g. "500ms", "30s", "5m")
    #[arg(short = 't', long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Redis lock server URL; repeat to lock across a quorum of servers
    #[cfg(feature = "redis")]
    #[arg(long = "server", value_name = "URL", conflicts_with = "lock_file")]
    pub servers: Vec<String>,

    /// Verbose output
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// Wait as long as it takes
    Block,
    /// Poll until the timeout
    Busy,
    /// Block, interrupted at the timeout
    Deadline,
}
