//! Persistent container registry.
//!
//! One JSON record per container at `<run_dir>/<name>/config.json`. The
//! directory tree is the whole database: there is no daemon and no index
//! file, so every command sees the state the previous one left behind.

use hutch_common::config::{HutchConfig, validate_name};
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, ContainerInfo, ContainerStatus};
use nix::unistd::Pid;

use crate::process::{is_alive, is_same_process};

/// Handle on the metadata root described by a [`HutchConfig`].
#[derive(Debug, Clone)]
pub struct Registry {
    config: HutchConfig,
}

impl Registry {
    /// Creates a registry over `config.run_dir`.
    #[must_use]
    pub const fn new(config: HutchConfig) -> Self {
        Self { config }
    }

    /// Configuration the registry was opened with.
    #[must_use]
    pub const fn config(&self) -> &HutchConfig {
        &self.config
    }

    /// Assigns a fresh id and resolves the container name.
    ///
    /// The name defaults to the id when none is requested.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::Config`] for an invalid name and
    /// [`HutchError::InvalidState`] when a record with that name exists.
    pub fn allocate(&self, requested_name: Option<&str>) -> Result<(ContainerId, String)> {
        let id = ContainerId::generate();
        let name = requested_name
            .filter(|n| !n.is_empty())
            .map_or_else(|| id.to_string(), str::to_owned);
        validate_name(&name)?;
        self.ensure_unused(&name)?;
        Ok((id, name))
    }

    /// Records a freshly started container and returns its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or taken, or the record
    /// cannot be written.
    pub fn record(&self, pid: Pid, command: &str, requested_name: Option<&str>) -> Result<String> {
        let (id, name) = self.allocate(requested_name)?;
        self.record_with(&ContainerInfo::running(id, &name, pid.as_raw(), command, None))?;
        Ok(name)
    }

    /// Writes the first record of a container whose identity was
    /// allocated beforehand.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidState`] when a record with the same name
    /// exists, or an I/O error if it cannot be written.
    pub fn record_with(&self, info: &ContainerInfo) -> Result<()> {
        self.ensure_unused(&info.name)?;
        let dir = self.config.container_dir(&info.name)?;
        std::fs::create_dir_all(&dir).map_err(HutchError::io(&dir))?;
        self.save(info)?;
        tracing::info!(name = %info.name, id = %info.id, pid = %info.pid, "container recorded");
        Ok(())
    }

    /// Loads the record of container `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::NotFound`] if no record exists, or an error if
    /// it cannot be read or parsed.
    pub fn load(&self, name: &str) -> Result<ContainerInfo> {
        let path = self.config.config_file(name)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HutchError::NotFound {
                    kind: "container",
                    id: name.to_string(),
                });
            }
            Err(e) => return Err(HutchError::Io { path, source: e }),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites the record of `info.name`.
    ///
    /// The new content is written to a sibling file and renamed over the
    /// record, so readers never observe a half-written file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, info: &ContainerInfo) -> Result<()> {
        let path = self.config.config_file(&info.name)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(info)?;
        std::fs::write(&tmp, json).map_err(HutchError::io(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(HutchError::io(&path))?;
        tracing::debug!(name = %info.name, status = %info.status, "record saved");
        Ok(())
    }

    /// Removes the whole metadata directory of `name`, log included.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn delete(&self, name: &str) -> Result<()> {
        let dir = self.config.container_dir(name)?;
        match std::fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(HutchError::Io { path: dir, source: e })
            }
            _ => {
                tracing::info!(name, "container record deleted");
                Ok(())
            }
        }
    }

    /// Loads every readable record, oldest first.
    ///
    /// Unreadable or corrupt records are logged and skipped. A `Running`
    /// record whose init process is gone is rewritten as `Exited`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the metadata root itself cannot be read.
    pub fn list(&self) -> Result<Vec<ContainerInfo>> {
        let run_dir = self.config.run_dir();
        let entries = match std::fs::read_dir(run_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HutchError::io(run_dir)(e)),
        };

        let mut containers = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.load(&name) {
                Ok(info) => containers.push(self.reconcile(info)),
                Err(e) => tracing::warn!(name, error = %e, "skipping unreadable container record"),
            }
        }
        containers.sort_by(|a, b| {
            a.creation_time
                .cmp(&b.creation_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(containers)
    }

    fn reconcile(&self, mut info: ContainerInfo) -> ContainerInfo {
        if info.status != ContainerStatus::Running {
            return info;
        }
        if info.init_pid().map(Pid::from_raw).is_some_and(|pid| {
            is_alive(pid) && is_same_process(pid, info.start_time)
        }) {
            return info;
        }
        tracing::info!(name = %info.name, pid = %info.pid, "init process gone, marking exited");
        info.finish(ContainerStatus::Exited);
        if let Err(e) = self.save(&info) {
            tracing::warn!(name = %info.name, error = %e, "could not persist exited status");
        }
        info
    }

    fn ensure_unused(&self, name: &str) -> Result<()> {
        match self.load(name) {
            Ok(existing) => Err(HutchError::InvalidState {
                name: name.to_string(),
                status: existing.status,
                operation: "create",
            }),
            Err(HutchError::NotFound { .. }) => Ok(()),
            Err(e) if config_exists(&self.config, name) => Err(HutchError::Config {
                message: format!("container {name} already has an unreadable record: {e}"),
            }),
            Err(e) => Err(e),
        }
    }
}

fn config_exists(config: &HutchConfig, name: &str) -> bool {
    config.config_file(name).is_ok_and(|p| p.exists())
}
