//! Lifecycle transitions of recorded containers: stop and remove.

use std::time::{Duration, Instant};

use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerInfo, ContainerStatus};
use hutch_core::cgroup::CgroupManager;
use hutch_core::filesystem::rootfs::RootfsLayout;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::process::{is_alive, is_same_process};
use crate::state::Registry;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Stops container `name` and records it as `Stopped` with a blank pid.
///
/// A running init process gets SIGTERM, then SIGKILL once the configured
/// grace period runs out. The record only changes after the process is
/// gone. An `Exited` record is marked `Stopped` without signalling, and
/// so is a recorded pid that now belongs to a different process.
///
/// # Errors
///
/// Returns [`HutchError::InvalidState`] for a record that is already
/// `Stopped`, or an error if signalling or saving the record fails.
pub fn stop(registry: &Registry, name: &str) -> Result<ContainerInfo> {
    let mut info = registry.load(name)?;
    match info.status {
        ContainerStatus::Running => {
            if let Some(pid) = info.init_pid().map(Pid::from_raw) {
                if is_same_process(pid, info.start_time) {
                    terminate(pid, registry.config().stop_grace)?;
                } else {
                    tracing::warn!(name, %pid, "init process gone and pid reused, not signalling");
                }
            }
        }
        ContainerStatus::Exited => {}
        ContainerStatus::Stopped => {
            return Err(HutchError::InvalidState {
                name: name.to_string(),
                status: info.status,
                operation: "stop",
            });
        }
    }
    info.finish(ContainerStatus::Stopped);
    registry.save(&info)?;
    tracing::info!(name, "container stopped");
    Ok(info)
}

/// Removes a stopped container: rootfs, cgroup, then its record.
///
/// Teardown failures are logged and do not keep the record alive.
///
/// # Errors
///
/// Returns [`HutchError::InvalidState`] unless the container is `Stopped`;
/// nothing is touched in that case.
pub fn remove(registry: &Registry, name: &str) -> Result<()> {
    let info = registry.load(name)?;
    if info.status != ContainerStatus::Stopped {
        return Err(HutchError::InvalidState {
            name: name.to_string(),
            status: info.status,
            operation: "remove",
        });
    }

    let layout = RootfsLayout::for_container(registry.config(), name, info.volume.as_deref())?;
    if layout.is_present() {
        let _ = layout.teardown();
    }
    let _ = CgroupManager::for_container(name, registry.config()).destroy();
    registry.delete(name)?;
    tracing::info!(name, "container removed");
    Ok(())
}

fn terminate(pid: Pid, grace: Duration) -> Result<()> {
    if !signal(pid, Signal::SIGTERM)? {
        return Ok(());
    }
    tracing::info!(%pid, grace_secs = grace.as_secs(), "sent SIGTERM");
    if wait_for_exit(pid, grace) {
        return Ok(());
    }

    tracing::warn!(%pid, "grace period elapsed, sending SIGKILL");
    if signal(pid, Signal::SIGKILL)? && !wait_for_exit(pid, KILL_WAIT) {
        tracing::warn!(%pid, "process still present after SIGKILL");
    }
    Ok(())
}

/// Sends `sig`; `Ok(false)` means the process was already gone.
fn signal(pid: Pid, sig: Signal) -> Result<bool> {
    match kill(pid, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(HutchError::Syscall {
            call: "kill",
            message: format!("{sig:?} to {pid}: {e}"),
        }),
    }
}

fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
