//! Running commands inside an already running container.
//!
//! `hutch exec` re-executes this binary with the target pid and command in
//! [`ENV_EXEC_PID`] and [`ENV_EXEC_CMD`]. The helper copy notices them on
//! its very first instruction, joins the container's namespaces while it is
//! still single-threaded, and runs the command through `/bin/sh -c`.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use hutch_common::constants::{ENV_EXEC_CMD, ENV_EXEC_PID};
use hutch_common::error::{HutchError, Result};
use hutch_common::types::ContainerStatus;
use hutch_core::namespace::join::join_namespaces;
use nix::unistd::Pid;

use crate::state::Registry;

const SELF_EXE: &str = "/proc/self/exe";
const SHELL: &str = "/bin/sh";

/// Helper-side entry point.
///
/// Returns `None` when this process is not an exec helper. Otherwise joins
/// the namespaces, runs the command, and returns the exit code to exit
/// with. Must be called before anything spawns a thread.
#[must_use]
#[allow(clippy::print_stderr)]
pub fn enter_from_env() -> Option<i32> {
    let pid = std::env::var(ENV_EXEC_PID).ok()?;
    let command = std::env::var(ENV_EXEC_CMD).ok()?;
    Some(match run_in_namespaces(&pid, &command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hutch exec: {e}");
            1
        }
    })
}

fn run_in_namespaces(pid: &str, command: &str) -> Result<i32> {
    let pid = pid
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| HutchError::Config {
            message: format!("{ENV_EXEC_PID} is not a pid: {pid:?}"),
        })?;
    join_namespaces(Pid::from_raw(pid))?;

    let status = Command::new(SHELL)
        .arg("-c")
        .arg(command)
        .env_remove(ENV_EXEC_PID)
        .env_remove(ENV_EXEC_CMD)
        .status()
        .map_err(HutchError::io(SHELL))?;
    Ok(exit_code(status))
}

/// Runs `command` inside container `name` and returns its exit code.
///
/// The helper inherits this process's stdio.
///
/// # Errors
///
/// Returns [`HutchError::InvalidState`] unless the container is `Running`,
/// or an error if the helper cannot be started.
pub fn exec_in_container(registry: &Registry, name: &str, command: &[String]) -> Result<i32> {
    if command.is_empty() {
        return Err(HutchError::Config {
            message: "exec command is empty".into(),
        });
    }
    let info = registry.load(name)?;
    let pid = match (info.status, info.init_pid()) {
        (ContainerStatus::Running, Some(pid)) => pid,
        (status, _) => {
            return Err(HutchError::InvalidState {
                name: name.to_string(),
                status,
                operation: "exec",
            });
        }
    };

    let command_line = command.join(" ");
    tracing::info!(name, pid, command = %command_line, "exec into container");
    let status = Command::new(SELF_EXE)
        .arg("exec")
        .env(ENV_EXEC_PID, pid.to_string())
        .env(ENV_EXEC_CMD, &command_line)
        .status()
        .map_err(HutchError::io(SELF_EXE))?;
    Ok(exit_code(status))
}

/// Shell-style exit code: the status, or `128 + signal`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use hutch_common::config::HutchConfig;
    use hutch_common::types::{ContainerId, ContainerInfo};

    use super::*;

    #[test]
    fn exec_into_stopped_container_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::new(HutchConfig::with_dirs(
            dir.path().join("run"),
            dir.path().join("data"),
        ));
        let mut info = ContainerInfo::running(ContainerId::new("A1"), "web1", 1, "sh", None);
        info.finish(ContainerStatus::Stopped);
        registry.record_with(&info).expect("record");

        let err = exec_in_container(&registry, "web1", &["ls".into()]).unwrap_err();
        assert!(matches!(
            err,
            HutchError::InvalidState {
                operation: "exec",
                status: ContainerStatus::Stopped,
                ..
            }
        ));
    }

    #[test]
    fn exec_into_unknown_container_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::new(HutchConfig::with_dirs(dir.path(), dir.path()));
        let err = exec_in_container(&registry, "ghost", &["ls".into()]).unwrap_err();
        assert!(matches!(err, HutchError::NotFound { .. }));
    }

    #[test]
    fn malformed_helper_pid_is_a_config_error() {
        assert!(matches!(
            run_in_namespaces("abc", "true"),
            Err(HutchError::Config { .. })
        ));
        assert!(run_in_namespaces("0", "true").is_err());
    }

    #[test]
    fn signal_deaths_map_above_128() {
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
