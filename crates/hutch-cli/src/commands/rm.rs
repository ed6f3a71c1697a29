//! `hutch rm`: Remove a stopped container.

use anyhow::Context;
use clap::Args;
use hutch_runtime::container::remove;
use hutch_runtime::state::Registry;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container does not exist or is not stopped.
pub fn execute(args: &RmArgs, registry: &Registry) -> anyhow::Result<()> {
    remove(registry, &args.container)
        .with_context(|| format!("failed to remove {}", args.container))?;
    println!("{}", args.container);
    Ok(())
}
