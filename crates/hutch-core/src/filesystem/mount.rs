//! Mount utilities for container filesystem setup.
//!
//! Handles mount propagation, `/proc` and `/dev` inside the container's
//! namespace, volume bind mounts, and unmounting.

use std::path::Path;

use hutch_common::error::{HutchError, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use procfs::process::Process;

/// Outcome of an unmount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmount {
    /// The mount was detached.
    Detached,
    /// Nothing was mounted at the target.
    NotMounted,
}

/// Marks the whole mount tree private and recursive.
///
/// Mounts made afterwards in this namespace never propagate back to the
/// host's mount namespace.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn make_mount_tree_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| syscall_error("mount --make-rprivate", Path::new("/"), e))?;
    tracing::debug!("mount tree made private");
    Ok(())
}

/// Creates a recursive bind mount from source to target.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| HutchError::Syscall {
        call: "mount",
        message: format!("bind {} -> {}: {e}", source.display(), target.display()),
    })?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Mounts a fresh `proc` filesystem at `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn mount_proc(target: &Path) -> Result<()> {
    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| syscall_error("mount proc", target, e))?;
    tracing::debug!(target = %target.display(), "proc mounted");
    Ok(())
}

/// Mounts a `tmpfs` for device nodes at `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn mount_dev(target: &Path) -> Result<()> {
    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| syscall_error("mount tmpfs", target, e))?;
    tracing::debug!(target = %target.display(), "dev tmpfs mounted");
    Ok(())
}

/// Returns whether `target` is currently a mount point in this namespace.
///
/// # Errors
///
/// Returns an error if `/proc/self/mountinfo` cannot be read.
pub fn is_mount_point(target: &Path) -> Result<bool> {
    let Ok(target) = std::fs::canonicalize(target) else {
        return Ok(false);
    };
    let mounts = Process::myself()
        .and_then(|p| p.mountinfo())
        .map_err(|e| HutchError::Syscall {
            call: "mountinfo",
            message: e.to_string(),
        })?;
    Ok(mounts.into_iter().any(|m| m.mount_point == target))
}

/// Unmounts `target`, detaching lazily when `lazy` is set.
///
/// A target that is not a mount point, or does not exist, is reported as
/// [`Unmount::NotMounted`] without calling `umount2(2)`.
///
/// # Errors
///
/// Returns an error if the mount table cannot be read or `umount2(2)`
/// fails (e.g. `EBUSY`, `EPERM`).
pub fn unmount(target: &Path, lazy: bool) -> Result<Unmount> {
    if !is_mount_point(target)? {
        return Ok(Unmount::NotMounted);
    }
    let flags = if lazy {
        MntFlags::MNT_DETACH
    } else {
        MntFlags::empty()
    };
    match umount2(target, flags) {
        Ok(()) => {
            tracing::debug!(target = %target.display(), "unmounted");
            Ok(Unmount::Detached)
        }
        Err(Errno::EINVAL | Errno::ENOENT) => Ok(Unmount::NotMounted),
        Err(e) => Err(syscall_error("umount", target, e)),
    }
}

fn syscall_error(call: &'static str, target: &Path, errno: Errno) -> HutchError {
    HutchError::Syscall {
        call,
        message: format!("{}: {errno}", target.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("merged");
        std::fs::create_dir(&sub).unwrap();
        assert!(!is_mount_point(&sub).unwrap());
        assert_eq!(unmount(&sub, true).unwrap(), Unmount::NotMounted);
    }

    #[test]
    fn missing_path_is_not_mounted() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(unmount(&dir.path().join("gone"), false).unwrap(), Unmount::NotMounted);
    }

    #[test]
    fn root_is_a_mount_point() {
        assert!(is_mount_point(Path::new("/")).unwrap());
    }
}
