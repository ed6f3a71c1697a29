//! Locating cgroup v1 hierarchy mounts.

use std::path::{Path, PathBuf};

use hutch_common::error::{HutchError, Result};
use procfs::process::{MountInfo, Process};

use super::Subsystem;

/// Where subsystem hierarchies are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupRoot {
    /// Look each hierarchy up in `/proc/self/mountinfo`.
    Discover,
    /// Each hierarchy is the directory `<root>/<subsystem>`.
    Fixed(PathBuf),
}

impl CgroupRoot {
    /// Builds the root from the optional configured directory.
    #[must_use]
    pub fn from_config(root: Option<&Path>) -> Self {
        root.map_or(Self::Discover, |dir| Self::Fixed(dir.to_path_buf()))
    }

    /// Returns the mount point of `subsystem`'s hierarchy.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is not mounted on this host.
    pub fn mount_point(&self, subsystem: Subsystem) -> Result<PathBuf> {
        match self {
            Self::Discover => discover(subsystem),
            Self::Fixed(root) => {
                let path = root.join(subsystem.name());
                if path.is_dir() {
                    Ok(path)
                } else {
                    Err(not_mounted(subsystem, &path.display().to_string()))
                }
            }
        }
    }
}

fn discover(subsystem: Subsystem) -> Result<PathBuf> {
    let mounts = Process::myself()
        .and_then(|p| p.mountinfo())
        .map_err(|e| HutchError::Cgroup {
            subsystem: subsystem.name(),
            operation: "locate",
            message: format!("reading mountinfo: {e}"),
        })?;
    find_mount(mounts.into_iter(), subsystem.name())
        .ok_or_else(|| not_mounted(subsystem, "/proc/self/mountinfo"))
}

/// Picks the `cgroup` mount whose super options name `subsystem`.
///
/// Options are matched as whole words so `cpu` never selects the `cpuset`
/// hierarchy, while a co-mounted `cpu,cpuacct` still matches `cpu`.
pub fn find_mount(mounts: impl IntoIterator<Item = MountInfo>, subsystem: &str) -> Option<PathBuf> {
    mounts
        .into_iter()
        .find(|m| m.fs_type == "cgroup" && m.super_options.contains_key(subsystem))
        .map(|m| m.mount_point)
}

fn not_mounted(subsystem: Subsystem, searched: &str) -> HutchError {
    HutchError::Cgroup {
        subsystem: subsystem.name(),
        operation: "locate",
        message: format!("hierarchy not mounted (searched {searched})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_root_resolves_subsystem_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("memory")).unwrap();
        let root = CgroupRoot::from_config(Some(dir.path()));

        assert_eq!(
            root.mount_point(Subsystem::Memory).unwrap(),
            dir.path().join("memory")
        );
        assert!(root.mount_point(Subsystem::Cpu).is_err());
    }

    #[test]
    fn unset_root_discovers() {
        assert_eq!(CgroupRoot::from_config(None), CgroupRoot::Discover);
    }
}
