//! Root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`. Runs inside the
//! container's fresh mount namespace only.

use std::path::Path;

use hutch_common::constants::PIVOT_DIR_NAME;
use hutch_common::error::{HutchError, Result};
use nix::mount::{MntFlags, umount2};
use nix::unistd;

use super::mount::{bind_mount, make_mount_tree_private};

/// Makes `new_root` the process root and discards the old root.
///
/// Steps, each fatal on failure:
/// 1. make the mount tree private and recursive,
/// 2. bind `new_root` onto itself so it is a distinct mount point,
/// 3. create `new_root/.pivot_root` and pivot with the old root there,
/// 4. `chdir("/")`, lazily unmount the old root, remove the directory.
///
/// # Errors
///
/// Returns an error naming the first step that failed.
pub fn pivot_root(new_root: &Path) -> Result<()> {
    make_mount_tree_private()?;
    bind_mount(new_root, new_root)?;

    let put_old = new_root.join(PIVOT_DIR_NAME);
    if !put_old.exists() {
        std::fs::create_dir_all(&put_old).map_err(HutchError::io(&put_old))?;
    }

    unistd::pivot_root(new_root, &put_old).map_err(|e| HutchError::Syscall {
        call: "pivot_root",
        message: format!("{} (old root at {}): {e}", new_root.display(), put_old.display()),
    })?;
    tracing::info!(new_root = %new_root.display(), "pivot_root done");

    unistd::chdir("/").map_err(|e| HutchError::Syscall {
        call: "chdir",
        message: format!("/: {e}"),
    })?;

    let old_root = Path::new("/").join(PIVOT_DIR_NAME);
    // /proc is not mounted yet, so the mount table cannot be consulted here.
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|e| HutchError::Syscall {
        call: "umount",
        message: format!("{}: {e}", old_root.display()),
    })?;
    std::fs::remove_dir(&old_root).map_err(HutchError::io(&old_root))?;
    tracing::debug!(old_root = %old_root.display(), "old root discarded");
    Ok(())
}
