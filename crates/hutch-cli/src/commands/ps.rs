//! `hutch ps`: List containers.

use clap::Args;
use hutch_runtime::state::Registry;

use crate::output::render_table;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {}

const HEADERS: [&str; 6] = ["ID", "NAME", "PID", "STATUS", "COMMAND", "CREATED"];

/// Executes the `ps` command.
///
/// Unreadable records are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the metadata root cannot be read.
pub fn execute(_args: &PsArgs, registry: &Registry) -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = registry
        .list()?
        .into_iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.name,
                c.pid,
                c.status.to_string(),
                c.command,
                c.creation_time,
            ]
        })
        .collect();
    print!("{}", render_table(&HEADERS, &rows));
    Ok(())
}
