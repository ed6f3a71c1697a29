//! Re-entering the namespaces of a running container.

use std::fs::File;
use std::path::PathBuf;

use hutch_common::constants::EXEC_NAMESPACES;
use hutch_common::error::{HutchError, Result};
use nix::sched::{CloneFlags, setns};
use nix::unistd::Pid;

/// Joins every namespace in [`EXEC_NAMESPACES`] of process `pid`.
///
/// All namespace files are opened before the first `setns(2)`: once the
/// mount namespace changes, `/proc/<pid>` may no longer resolve. The
/// caller must still be single-threaded, since the kernel refuses to move
/// a multithreaded process into another mount namespace.
///
/// Joining the PID namespace only affects children forked afterwards.
///
/// # Errors
///
/// Returns [`HutchError::NotFound`] if the process is gone, or a syscall
/// error naming the namespace that could not be joined.
pub fn join_namespaces(pid: Pid) -> Result<()> {
    let proc_dir = PathBuf::from(format!("/proc/{pid}"));
    if !proc_dir.exists() {
        return Err(HutchError::NotFound {
            kind: "process",
            id: pid.to_string(),
        });
    }

    let handles = EXEC_NAMESPACES
        .iter()
        .map(|ns| {
            let path = proc_dir.join("ns").join(ns);
            File::open(&path)
                .map(|file| (*ns, file))
                .map_err(HutchError::io(path))
        })
        .collect::<Result<Vec<_>>>()?;

    for (ns, file) in &handles {
        setns(file, namespace_flag(ns)).map_err(|e| HutchError::Syscall {
            call: "setns",
            message: format!("{ns} namespace of {pid}: {e}"),
        })?;
        tracing::debug!(%pid, namespace = ns, "joined namespace");
    }
    Ok(())
}

fn namespace_flag(ns: &str) -> CloneFlags {
    match ns {
        "ipc" => CloneFlags::CLONE_NEWIPC,
        "uts" => CloneFlags::CLONE_NEWUTS,
        "net" => CloneFlags::CLONE_NEWNET,
        "pid" => CloneFlags::CLONE_NEWPID,
        "mnt" => CloneFlags::CLONE_NEWNS,
        "user" => CloneFlags::CLONE_NEWUSER,
        _ => CloneFlags::empty(),
    }
}
