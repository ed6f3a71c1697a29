//! `hutch run`: Run a command in a new container.

use clap::Args;
use hutch_common::types::{IdMapping, ResourceConfig};
use hutch_runtime::process::{RunOptions, RunOutcome, run};
use hutch_runtime::state::Registry;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Attach to the terminal and wait for the container to exit.
    #[arg(short, long, conflicts_with = "detach")]
    pub tty: bool,

    /// Run in the background with output in the container log (default).
    #[arg(short, long)]
    pub detach: bool,

    /// Bind a host directory into the container (`HOST:CONTAINER`).
    #[arg(short, long, value_name = "HOST:CONTAINER")]
    pub volume: Option<String>,

    /// Memory limit, e.g. `500m`.
    #[arg(short, long)]
    pub memory: Option<String>,

    /// Relative CPU weight.
    #[arg(long)]
    pub cpu_share: Option<String>,

    /// CPUs the container may run on, e.g. `0-1`.
    #[arg(long)]
    pub cpu_set: Option<String>,

    /// Container name [default: the generated id].
    #[arg(long)]
    pub name: Option<String>,

    /// Run in a user namespace mapping one container id to a host uid/gid.
    #[arg(long, value_name = "CONTAINER_ID:HOST_UID:HOST_GID")]
    pub user_map: Option<IdMapping>,

    /// Program and arguments to run.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn options(self) -> RunOptions {
        RunOptions {
            command: self.command,
            tty: self.tty,
            name: self.name,
            volume: self.volume,
            resources: ResourceConfig {
                memory_limit: self.memory.unwrap_or_default(),
                cpu_share: self.cpu_share.unwrap_or_default(),
                cpu_set: self.cpu_set.unwrap_or_default(),
            },
            user_map: self.user_map,
        }
    }
}

/// Executes the `run` command.
///
/// Interactive runs exit with the container's exit code.
///
/// # Errors
///
/// Returns an error if the container cannot be started.
pub fn execute(args: RunArgs, registry: &Registry) -> anyhow::Result<()> {
    match run(registry, &args.options())? {
        RunOutcome::Detached { name, .. } => {
            println!("{name}");
            Ok(())
        }
        RunOutcome::Exited { code, .. } => std::process::exit(code),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Command};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("hutch").chain(args.iter().copied()))
    }

    #[test]
    fn tty_and_detach_are_mutually_exclusive() {
        assert!(parse(&["run", "-t", "-d", "sh"]).is_err());
    }

    #[test]
    fn limits_and_trailing_command_are_collected() {
        let cli = parse(&["run", "-t", "-m", "500m", "--cpu-set", "0-1", "echo", "-n", "hello"])
            .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let opts = args.options();
        assert!(opts.tty);
        assert_eq!(opts.command, vec!["echo", "-n", "hello"]);
        assert_eq!(opts.resources.memory_limit, "500m");
        assert_eq!(opts.resources.cpu_set, "0-1");
        assert!(opts.resources.cpu_share.is_empty());
    }

    #[test]
    fn user_map_is_parsed() {
        let cli = parse(&["run", "--user-map", "0:1000:1000", "sh"]).expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.user_map.map(|m| m.host_uid), Some(1000));
        assert!(parse(&["run", "--user-map", "0:1000", "sh"]).is_err());
    }

    #[test]
    fn command_is_required() {
        assert!(parse(&["run", "-t"]).is_err());
    }
}
