//! CPU pinning via the cgroup v1 `cpuset` subsystem.

use std::path::Path;

/// Allowed CPU list control file.
pub const CPUS_FILE: &str = "cpuset.cpus";

/// Allowed memory node list control file.
pub const MEMS_FILE: &str = "cpuset.mems";

/// Restricts a cgroup to the CPUs in `cpus` (e.g. `0-1,3`).
///
/// # Errors
///
/// Returns an error if writing to `cpuset.cpus` fails.
pub fn set_cpus(cgroup_path: &Path, cpus: &str) -> std::io::Result<()> {
    std::fs::write(cgroup_path.join(CPUS_FILE), cpus)?;
    tracing::debug!(cpus, "cpuset set");
    Ok(())
}

/// Copies empty `cpuset.cpus` / `cpuset.mems` down from the parent chain.
///
/// A fresh cpuset cgroup starts with both lists empty and the kernel
/// refuses to attach tasks to it until they are filled. Ancestors up to
/// `mount_point` are initialized first. Files that do not exist are skipped.
///
/// # Errors
///
/// Returns an error if reading or writing a control file fails.
pub fn inherit_from_parent(cgroup_path: &Path, mount_point: &Path) -> std::io::Result<()> {
    if cgroup_path == mount_point || !cgroup_path.starts_with(mount_point) {
        return Ok(());
    }
    let Some(parent) = cgroup_path.parent() else {
        return Ok(());
    };
    inherit_from_parent(parent, mount_point)?;

    for file in [CPUS_FILE, MEMS_FILE] {
        let own = cgroup_path.join(file);
        let inherited = parent.join(file);
        if !own.exists() || !inherited.exists() {
            continue;
        }
        if std::fs::read_to_string(&own)?.trim().is_empty() {
            let value = std::fs::read_to_string(&inherited)?;
            std::fs::write(&own, value.trim())?;
            tracing::debug!(file, value = value.trim(), "inherited cpuset value");
        }
    }
    Ok(())
}
