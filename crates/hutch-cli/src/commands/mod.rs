//! CLI command definitions and dispatch.

pub mod exec;
pub mod init;
pub mod logs;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hutch_common::config::HutchConfig;
use hutch_common::constants::{DEFAULT_DATA_DIR, DEFAULT_RUN_DIR, DEFAULT_STOP_GRACE_SECS};
use hutch_runtime::state::Registry;

/// hutch, a minimal container engine.
#[derive(Parser, Debug)]
#[command(name = "hutch", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Paths and timeouts shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global options, each with an environment fallback.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Root of per-container metadata directories.
    #[arg(long, global = true, env = "HUTCH_RUN_DIR", default_value = DEFAULT_RUN_DIR)]
    pub run_dir: PathBuf,

    /// Root of the base layer, write layers, and merge points.
    #[arg(long, global = true, env = "HUTCH_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Base image archive [default: <data-dir>/busybox.tar].
    #[arg(long, global = true, env = "HUTCH_BASE_IMAGE")]
    pub base_image: Option<PathBuf>,

    /// Directory holding one cgroup v1 hierarchy per subsystem
    /// [default: discovered from the mount table].
    #[arg(long, global = true, env = "HUTCH_CGROUP_ROOT")]
    pub cgroup_root: Option<PathBuf>,

    /// Seconds between SIGTERM and SIGKILL on stop.
    #[arg(long, global = true, env = "HUTCH_STOP_TIMEOUT", default_value_t = DEFAULT_STOP_GRACE_SECS)]
    pub stop_timeout: u64,
}

impl GlobalArgs {
    /// Builds the runtime configuration.
    #[must_use]
    pub fn config(&self) -> HutchConfig {
        let mut config = HutchConfig::with_dirs(&self.run_dir, &self.data_dir);
        if let Some(base_image) = &self.base_image {
            config.base_image.clone_from(base_image);
        }
        config.cgroup_root.clone_from(&self.cgroup_root);
        config.stop_grace = Duration::from_secs(self.stop_timeout);
        config
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in a new container.
    Run(run::RunArgs),
    /// Run a command inside a running container.
    Exec(exec::ExecArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a stopped container.
    Rm(rm::RmArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Print the output of a detached container.
    Logs(logs::LogsArgs),
    /// Container init process; started by `run`, never by users.
    #[command(hide = true)]
    Init(init::InitArgs),
}

impl Command {
    /// Log level used when `RUST_LOG` is unset.
    ///
    /// The init process shares its stderr with the container, so it only
    /// reports problems.
    #[must_use]
    pub const fn default_log_level(&self) -> &'static str {
        match self {
            Self::Init(_) => "warn",
            _ => "info",
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let registry = Registry::new(cli.global.config());
    match cli.command {
        Command::Run(args) => run::execute(args, &registry),
        Command::Exec(args) => exec::execute(args, &registry),
        Command::Stop(args) => stop::execute(&args, &registry),
        Command::Rm(args) => rm::execute(&args, &registry),
        Command::Ps(args) => ps::execute(&args, &registry),
        Command::Logs(args) => logs::execute(&args, &registry),
        Command::Init(args) => init::execute(&args),
    }
}
