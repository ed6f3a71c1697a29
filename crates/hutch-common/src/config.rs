//! Global configuration model for the hutch runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HutchError, Result};

/// Root configuration for the hutch runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HutchConfig {
    /// Root of per-container metadata directories.
    pub run_dir: PathBuf,
    /// Root of the base layer, write layers, and merge points.
    pub data_dir: PathBuf,
    /// Archive the shared read-only base layer is extracted from.
    pub base_image: PathBuf,
    /// Fixed cgroup v1 root holding one directory per subsystem.
    ///
    /// `None` discovers each hierarchy from `/proc/self/mountinfo`.
    pub cgroup_root: Option<PathBuf>,
    /// Time allowed between SIGTERM and SIGKILL on stop.
    pub stop_grace: Duration,
}

impl Default for HutchConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(constants::DEFAULT_DATA_DIR);
        Self {
            run_dir: PathBuf::from(constants::DEFAULT_RUN_DIR),
            base_image: data_dir.join(constants::BASE_IMAGE_ARCHIVE),
            data_dir,
            cgroup_root: None,
            stop_grace: Duration::from_secs(constants::DEFAULT_STOP_GRACE_SECS),
        }
    }
}

impl HutchConfig {
    /// Builds a configuration rooted at `data_dir` and `run_dir`.
    ///
    /// The base image archive defaults to `<data_dir>/busybox.tar`.
    #[must_use]
    pub fn with_dirs(run_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            run_dir: run_dir.into(),
            base_image: data_dir.join(constants::BASE_IMAGE_ARCHIVE),
            data_dir,
            ..Self::default()
        }
    }

    /// Metadata directory of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn container_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.run_dir.join(name))
    }

    /// Metadata record path of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn config_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.container_dir(name)?.join(constants::CONFIG_FILE_NAME))
    }

    /// Detached-mode log file path of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn log_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.container_dir(name)?.join(constants::LOG_FILE_NAME))
    }

    /// Shared read-only base layer directory.
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.data_dir.join("base")
    }

    /// Writable layer directory owned by one container.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn write_layer(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.data_dir.join("layers").join(name))
    }

    /// Merge mount point of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn merge_point(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.data_dir.join("mnt").join(name))
    }

    /// Returns the metadata root.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

/// Checks that `name` can be used as a single path component.
///
/// # Errors
///
/// Returns [`HutchError::Config`] for empty names, names containing `/`
/// or NUL, the `.`/`..` components, and names longer than
/// [`constants::MAX_NAME_LEN`] bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(HutchError::Config {
            message: format!("invalid container name {name:?}"),
        });
    }
    if name.len() > constants::MAX_NAME_LEN {
        return Err(HutchError::Config {
            message: format!(
                "container name is {} bytes, the limit is {}",
                name.len(),
                constants::MAX_NAME_LEN
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_match_constants() {
        let cfg = HutchConfig::default();
        assert_eq!(cfg.run_dir, PathBuf::from("/var/run/hutch"));
        assert_eq!(cfg.base_image, PathBuf::from("/var/lib/hutch/busybox.tar"));
        assert!(cfg.cgroup_root.is_none());
    }

    #[test]
    fn per_container_paths_are_keyed_by_name() {
        let cfg = HutchConfig::with_dirs("/run/h", "/data/h");
        assert_eq!(
            cfg.config_file("web1").unwrap(),
            PathBuf::from("/run/h/web1/config.json")
        );
        assert_eq!(
            cfg.log_file("web1").unwrap(),
            PathBuf::from("/run/h/web1/container.log")
        );
        assert_eq!(cfg.write_layer("web1").unwrap(), PathBuf::from("/data/h/layers/web1"));
        assert_eq!(cfg.merge_point("web1").unwrap(), PathBuf::from("/data/h/mnt/web1"));
        assert_eq!(cfg.base_dir(), PathBuf::from("/data/h/base"));
    }

    #[test]
    fn names_escaping_the_root_are_rejected() {
        let cfg = HutchConfig::default();
        assert!(cfg.container_dir("../etc").is_err());
        assert!(cfg.container_dir("").is_err());
        assert!(cfg.merge_point("..").is_err());
        assert!(validate_name("web-1").is_ok());
    }

    #[test]
    fn names_must_fit_in_a_hostname() {
        let longest = "a".repeat(constants::MAX_NAME_LEN);
        assert!(validate_name(&longest).is_ok());

        let err = validate_name(&"a".repeat(70)).unwrap_err();
        assert!(matches!(err, HutchError::Config { .. }));
        assert!(HutchConfig::default().container_dir(&"a".repeat(65)).is_err());
    }
}
