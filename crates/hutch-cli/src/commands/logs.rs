//! `hutch logs`: Print the output of a detached container.

use clap::Args;
use hutch_runtime::logs::read_logs;
use hutch_runtime::state::Registry;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
pub fn execute(args: &LogsArgs, registry: &Registry) -> anyhow::Result<()> {
    print!("{}", read_logs(registry, &args.container)?);
    Ok(())
}
