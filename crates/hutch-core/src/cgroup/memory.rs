//! Memory resource control via the cgroup v1 `memory` subsystem.

use std::path::Path;

/// Hard memory limit control file.
pub const LIMIT_FILE: &str = "memory.limit_in_bytes";

/// Sets the hard memory limit for a cgroup.
///
/// The kernel accepts suffixed values (`500m`, `1g`) and rounds the limit
/// to the page size.
///
/// # Errors
///
/// Returns an error if writing to `memory.limit_in_bytes` fails.
pub fn set_memory_limit(cgroup_path: &Path, limit: &str) -> std::io::Result<()> {
    std::fs::write(cgroup_path.join(LIMIT_FILE), limit)?;
    tracing::debug!(limit, "memory limit set");
    Ok(())
}
