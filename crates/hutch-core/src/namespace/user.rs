//! User namespace id mapping.
//!
//! Maps one id inside the container onto an unprivileged host uid/gid.

use std::path::PathBuf;

use hutch_common::error::{HutchError, Result};
use hutch_common::types::IdMapping;
use nix::unistd::Pid;

/// Writes the uid and gid maps of a freshly cloned child.
///
/// `setgroups` is denied first, which the kernel requires before an
/// unprivileged process may write `gid_map`. Must run before the child
/// is released from the handoff pipe.
///
/// # Errors
///
/// Returns an error if writing `/proc/<pid>/setgroups`, `uid_map`, or
/// `gid_map` fails.
pub fn write_id_maps(pid: Pid, mapping: &IdMapping) -> Result<()> {
    let proc_dir = PathBuf::from(format!("/proc/{pid}"));

    let setgroups = proc_dir.join("setgroups");
    if setgroups.exists() {
        std::fs::write(&setgroups, "deny").map_err(HutchError::io(&setgroups))?;
    }

    let uid_map = proc_dir.join("uid_map");
    std::fs::write(&uid_map, map_line(mapping.container_id, mapping.host_uid))
        .map_err(HutchError::io(&uid_map))?;

    let gid_map = proc_dir.join("gid_map");
    std::fs::write(&gid_map, map_line(mapping.container_id, mapping.host_gid))
        .map_err(HutchError::io(&gid_map))?;

    tracing::debug!(
        %pid,
        container_id = mapping.container_id,
        host_uid = mapping.host_uid,
        host_gid = mapping.host_gid,
        "wrote uid/gid maps"
    );
    Ok(())
}

fn map_line(inside: u32, outside: u32) -> String {
    format!("{inside} {outside} 1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_line_covers_a_single_id() {
        assert_eq!(map_line(0, 1000), "0 1000 1");
    }

    #[test]
    fn missing_process_is_an_io_error() {
        let mapping = IdMapping {
            container_id: 0,
            host_uid: 1000,
            host_gid: 1000,
        };
        let err = write_id_maps(Pid::from_raw(i32::MAX), &mapping).unwrap_err();
        assert!(matches!(err, HutchError::Io { .. }));
    }
}
