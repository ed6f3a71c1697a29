//! `hutch init`: Container init process, entered from `hutch run`.

use anyhow::Context;
use clap::Args;
use hutch_runtime::init::run_init;

/// Arguments for the hidden `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Name of the container, used as its hostname.
    pub name: String,
}

/// Executes the handoff protocol; only returns on failure.
///
/// # Errors
///
/// Returns the first failing init step.
pub fn execute(args: &InitArgs) -> anyhow::Result<()> {
    let never = run_init(&args.name).context("container init failed")?;
    match never {}
}
