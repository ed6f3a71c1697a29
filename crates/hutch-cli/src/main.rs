//! # hutch
//!
//! Minimal single-host container engine: namespaces, cgroup v1 limits,
//! and an overlay root filesystem per container.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    // Exec helpers must join the container's namespaces while this process
    // is still single-threaded, before anything else runs.
    if let Some(code) = hutch_runtime::exec::enter_from_env() {
        std::process::exit(code);
    }

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.command.default_log_level())),
        )
        .init();

    commands::execute(cli)
}
