//! CPU share control via the cgroup v1 `cpu` subsystem.

use std::path::Path;

/// Relative CPU weight control file.
pub const SHARES_FILE: &str = "cpu.shares";

/// Sets the CPU share weight for a cgroup.
///
/// Shares only take effect under contention: a cgroup with 1024 shares
/// gets twice the CPU time of one with 512 when both are busy.
///
/// # Errors
///
/// Returns an error if writing to `cpu.shares` fails.
pub fn set_cpu_shares(cgroup_path: &Path, shares: &str) -> std::io::Result<()> {
    std::fs::write(cgroup_path.join(SHARES_FILE), shares)?;
    tracing::debug!(shares, "CPU shares set");
    Ok(())
}
