mod args;
mod run_command;

use interlock::Result;
pub use args::{Args, StrategyArg};

/// Run the command described by `args`, returning the exit code to use
pub fn run(args: Args) -> Result<i32> {
    run_command::execute_run(args)
}
