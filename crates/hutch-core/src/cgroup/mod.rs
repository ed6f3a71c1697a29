//! Cgroups v1 resource management.
//!
//! Each resource kind lives in its own kernel hierarchy (`cpu`, `cpuset`,
//! `memory`). A logical cgroup name such as `hutch/web1` is mapped to one
//! directory per hierarchy, created on demand. The set of subsystems is
//! closed and fixed at compile time: see [`SUBSYSTEMS`].

pub mod cpu;
pub mod cpuset;
pub mod hierarchy;
pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};

use hutch_common::config::HutchConfig;
use hutch_common::constants::CGROUP_PARENT;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::ResourceConfig;
use nix::unistd::Pid;

pub use hierarchy::CgroupRoot;

/// Task membership file present in every v1 cgroup directory.
pub const TASKS_FILE: &str = "tasks";

/// A cgroup v1 subsystem driven by hutch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// CPU share weight (`cpu.shares`).
    Cpu,
    /// CPU pinning (`cpuset.cpus`).
    Cpuset,
    /// Memory limit (`memory.limit_in_bytes`).
    Memory,
}

/// Every subsystem, in the order the manager visits them.
pub const SUBSYSTEMS: [Subsystem; 3] = [Subsystem::Cpuset, Subsystem::Memory, Subsystem::Cpu];

impl Subsystem {
    /// Name of the kernel hierarchy this subsystem is mounted under.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cpuset => "cpuset",
            Self::Memory => "memory",
        }
    }

    /// Limit control file written by [`Subsystem::set`].
    #[must_use]
    pub const fn control_file(self) -> &'static str {
        match self {
            Self::Cpu => cpu::SHARES_FILE,
            Self::Cpuset => cpuset::CPUS_FILE,
            Self::Memory => memory::LIMIT_FILE,
        }
    }

    /// Field of `res` this subsystem is responsible for.
    #[must_use]
    pub fn requested(self, res: &ResourceConfig) -> &str {
        match self {
            Self::Cpu => &res.cpu_share,
            Self::Cpuset => &res.cpu_set,
            Self::Memory => &res.memory_limit,
        }
    }

    /// Resolves the directory of `cgroup` inside this subsystem's hierarchy.
    ///
    /// With `create`, missing directories are created. For `cpuset` the
    /// empty CPU and memory-node lists of the new directory and of every
    /// ancestor are then filled from their parents, so the kernel accepts
    /// both a narrower `cpuset.cpus` and task attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is not mounted or the directory
    /// cannot be created or initialized.
    pub fn cgroup_path(self, root: &CgroupRoot, cgroup: &str, create: bool) -> Result<PathBuf> {
        let mount_point = root.mount_point(self)?;
        let path = mount_point.join(cgroup);
        if !create {
            return Ok(path);
        }
        if !path.exists() {
            std::fs::create_dir_all(&path).map_err(|e| self.error("create", &path, &e))?;
            tracing::debug!(subsystem = self.name(), path = %path.display(), "cgroup created");
        }
        if self == Self::Cpuset {
            cpuset::inherit_from_parent(&path, &mount_point)
                .map_err(|e| self.error("create", &path, &e))?;
        }
        Ok(path)
    }

    /// Writes the requested limit into the subsystem's control file.
    ///
    /// Empty fields are skipped: the control file is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be resolved or the kernel
    /// rejects the value.
    pub fn set(self, root: &CgroupRoot, cgroup: &str, res: &ResourceConfig) -> Result<()> {
        let path = self.cgroup_path(root, cgroup, true)?;
        let value = self.requested(res);
        if value.is_empty() {
            return Ok(());
        }
        let written = match self {
            Self::Cpu => cpu::set_cpu_shares(&path, value),
            Self::Cpuset => cpuset::set_cpus(&path, value),
            Self::Memory => memory::set_memory_limit(&path, value),
        };
        written.map_err(|e| self.error("set", &path.join(self.control_file()), &e))
    }

    /// Moves `pid` into this subsystem's directory for `cgroup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be resolved or the pid
    /// cannot be written to the task file.
    pub fn apply(self, root: &CgroupRoot, cgroup: &str, pid: Pid) -> Result<()> {
        let path = self.cgroup_path(root, cgroup, true)?;
        let tasks = path.join(TASKS_FILE);
        std::fs::write(&tasks, pid.to_string()).map_err(|e| self.error("apply", &tasks, &e))?;
        tracing::debug!(subsystem = self.name(), %pid, "added process to cgroup");
        Ok(())
    }

    /// Deletes this subsystem's directory for `cgroup`.
    ///
    /// A directory that does not exist is already removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is not mounted or the kernel
    /// refuses the removal (e.g. tasks still attached).
    pub fn remove(self, root: &CgroupRoot, cgroup: &str) -> Result<()> {
        let path = self.cgroup_path(root, cgroup, false)?;
        if !path.exists() {
            return Ok(());
        }
        remove_cgroup_dir(&path).map_err(|e| self.error("remove", &path, &e))?;
        tracing::debug!(subsystem = self.name(), path = %path.display(), "cgroup removed");
        Ok(())
    }

    fn error(self, operation: &'static str, path: &Path, err: &dyn fmt::Display) -> HutchError {
        HutchError::Cgroup {
            subsystem: self.name(),
            operation,
            message: format!("{}: {err}", path.display()),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Removes a cgroup directory.
///
/// Kernel cgroup directories only accept `rmdir(2)`; their control files
/// cannot be unlinked. A directory on a regular filesystem still holds its
/// files after a failed `rmdir`, so it is removed recursively instead.
fn remove_cgroup_dir(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir(path) {
        Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {
            std::fs::remove_dir_all(path)
        }
        other => other,
    }
}

/// Aggregates every subsystem behind one logical cgroup name.
///
/// Operations visit all subsystems even when one fails; failures are logged
/// and returned together. There is no rollback: a caller that needs all
/// limits in place must check the returned failures.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    name: String,
    root: CgroupRoot,
}

impl CgroupManager {
    /// Creates a manager for an explicit cgroup name.
    #[must_use]
    pub fn new(name: impl Into<String>, root: CgroupRoot) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Creates the manager for a container: `hutch/<container>`.
    #[must_use]
    pub fn for_container(container: &str, config: &HutchConfig) -> Self {
        Self::new(
            format!("{CGROUP_PARENT}/{container}"),
            CgroupRoot::from_config(config.cgroup_root.as_deref()),
        )
    }

    /// Logical cgroup name shared by all subsystems.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes `res` into every subsystem.
    #[must_use = "failed subsystems leave their limit unset"]
    pub fn set(&self, res: &ResourceConfig) -> Vec<HutchError> {
        self.each("set", |subsystem| subsystem.set(&self.root, &self.name, res))
    }

    /// Places `pid` under every subsystem.
    #[must_use = "failed subsystems do not constrain the process"]
    pub fn apply(&self, pid: Pid) -> Vec<HutchError> {
        self.each("apply", |subsystem| subsystem.apply(&self.root, &self.name, pid))
    }

    /// Removes the cgroup from every subsystem.
    ///
    /// Stale directories are a recoverable leak, so failures are only
    /// reported, never escalated.
    pub fn destroy(&self) -> Vec<HutchError> {
        let failures = self.each("remove", |subsystem| subsystem.remove(&self.root, &self.name));
        if failures.is_empty() {
            tracing::info!(cgroup = %self.name, "cgroup destroyed");
        }
        failures
    }

    fn each(
        &self,
        operation: &str,
        mut op: impl FnMut(Subsystem) -> Result<()>,
    ) -> Vec<HutchError> {
        SUBSYSTEMS
            .iter()
            .filter_map(|&subsystem| op(subsystem).err())
            .inspect(|err| {
                tracing::warn!(cgroup = %self.name, operation, error = %err, "cgroup operation failed");
            })
            .collect()
    }
}
