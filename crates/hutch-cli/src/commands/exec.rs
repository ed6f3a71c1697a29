//! `hutch exec`: Run a command inside a running container.

use clap::Args;
use hutch_runtime::exec::exec_in_container;
use hutch_runtime::state::Registry;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container name.
    pub container: String,

    /// Command to execute.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command and exits with the command's status.
///
/// # Errors
///
/// Returns an error if the container is not running or the helper
/// cannot be started.
pub fn execute(args: ExecArgs, registry: &Registry) -> anyhow::Result<()> {
    let code = exec_in_container(registry, &args.container, &args.command)?;
    std::process::exit(code);
}
