//! `hutch stop`: Stop a running container.

use clap::Args;
use hutch_runtime::container::stop;
use hutch_runtime::state::Registry;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container does not exist, is already stopped,
/// or cannot be signalled.
pub fn execute(args: &StopArgs, registry: &Registry) -> anyhow::Result<()> {
    let info = stop(registry, &args.container)?;
    println!("{}", info.name);
    Ok(())
}
