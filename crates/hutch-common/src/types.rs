//! Domain primitive types used across the hutch workspace.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::{HutchError, Result};

/// Length of a generated container identifier.
pub const CONTAINER_ID_LEN: usize = 10;

/// Short random identifier assigned to a container at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 10-character upper-case hex identifier.
    #[must_use]
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        Self(hex[..CONTAINER_ID_LEN].to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource limits requested for a container.
///
/// Values are passed to the kernel verbatim. An empty field leaves the
/// resource unconstrained and is never written to a control file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit, e.g. `"500m"`.
    pub memory_limit: String,
    /// Relative CPU weight, e.g. `"512"`.
    pub cpu_share: String,
    /// CPU list, e.g. `"0-1"`.
    pub cpu_set: String,
}

impl ResourceConfig {
    /// Returns true when no limit is requested.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.memory_limit.is_empty() && self.cpu_share.is_empty() && self.cpu_set.is_empty()
    }
}

/// Lifecycle status of a container record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// The init process is alive.
    Running,
    /// The container was stopped explicitly.
    Stopped,
    /// The init process exited on its own.
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Exited => write!(f, "Exited"),
        }
    }
}

/// Metadata record persisted for every container.
///
/// Serialized as `<run_dir>/<name>/config.json`. `pid` is kept as a string
/// and is blank whenever the container is not `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Random identifier assigned at creation.
    pub id: ContainerId,
    /// Host pid of the init process, blank unless running.
    pub pid: String,
    /// Unique container name.
    pub name: String,
    /// Command line as given by the user.
    pub command: String,
    /// Local creation time, formatted with [`TIMESTAMP_FORMAT`].
    #[serde(rename = "creationTime")]
    pub creation_time: String,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// Volume spec used at run time, needed to unmount it on removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Start time of the init process in clock ticks after boot, as read
    /// from `/proc/<pid>/stat`. Tells the init apart from a later process
    /// that reuses its pid.
    #[serde(rename = "startTime", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

impl ContainerInfo {
    /// Builds the record of a container whose init process just started.
    #[must_use]
    pub fn running(
        id: ContainerId,
        name: impl Into<String>,
        pid: i32,
        command: impl Into<String>,
        volume: Option<String>,
    ) -> Self {
        Self {
            id,
            pid: pid.to_string(),
            name: name.into(),
            command: command.into(),
            creation_time: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            status: ContainerStatus::Running,
            volume,
            start_time: None,
        }
    }

    /// Attaches the init process start time.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: Option<u64>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Parsed init pid, `None` when blank or malformed.
    #[must_use]
    pub fn init_pid(&self) -> Option<i32> {
        self.pid.trim().parse().ok().filter(|pid| *pid > 0)
    }

    /// Moves the record to `status` and clears the pid.
    pub fn finish(&mut self, status: ContainerStatus) {
        self.status = status;
        self.pid.clear();
        self.start_time = None;
    }
}

/// A `host:container` directory binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Directory on the host.
    pub host: PathBuf,
    /// Absolute directory inside the container.
    pub container: PathBuf,
}

impl VolumeSpec {
    /// Parses `hostPath:containerPath`.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::Config`] unless the spec has exactly two
    /// non-empty components, or if the container side escapes the root.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let [host, container] = parts.as_slice() else {
            return Err(HutchError::Config {
                message: format!("volume spec {spec:?} must be host:container"),
            });
        };
        if host.is_empty() || container.is_empty() {
            return Err(HutchError::Config {
                message: format!("volume spec {spec:?} has an empty component"),
            });
        }
        let container = PathBuf::from(container);
        if container.components().any(|c| c == Component::ParentDir) {
            return Err(HutchError::Config {
                message: format!("volume target {} may not contain '..'", container.display()),
            });
        }
        Ok(Self {
            host: PathBuf::from(host),
            container,
        })
    }

    /// Resolves the container side beneath `root`.
    ///
    /// `Path::join` would discard `root` for an absolute target, so leading
    /// separators are stripped first.
    #[must_use]
    pub fn target_in(&self, root: &Path) -> PathBuf {
        let relative: PathBuf = self
            .container
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        root.join(relative)
    }
}

impl FromStr for VolumeSpec {
    type Err = HutchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VolumeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.display(), self.container.display())
    }
}

/// Single-id mapping for the optional user namespace.
///
/// `container_id` is used for both the uid and gid inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// Uid/gid seen inside the container.
    pub container_id: u32,
    /// Host uid it maps to.
    pub host_uid: u32,
    /// Host gid it maps to.
    pub host_gid: u32,
}

impl FromStr for IdMapping {
    type Err = HutchError;

    /// Parses `CONTAINER_ID:HOST_UID:HOST_GID`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HutchError::Config {
            message: format!("user mapping {s:?} must be CONTAINER_ID:HOST_UID:HOST_GID"),
        };
        let ids = s
            .split(':')
            .map(|part| part.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        match ids.as_slice() {
            &[container_id, host_uid, host_gid] => Ok(Self {
                container_id,
                host_uid,
                host_gid,
            }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_hex() {
        let id = ContainerId::generate();
        assert_eq!(id.as_str().len(), CONTAINER_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, ContainerId::generate());
    }

    #[test]
    fn status_serializes_as_capitalized_word() {
        let json = serde_json::to_string(&ContainerStatus::Stopped).unwrap();
        assert_eq!(json, "\"Stopped\"");
        let back: ContainerStatus = serde_json::from_str("\"Exited\"").unwrap();
        assert_eq!(back, ContainerStatus::Exited);
    }

    #[test]
    fn empty_resource_config_is_unconstrained() {
        assert!(ResourceConfig::default().is_unconstrained());
        let res = ResourceConfig {
            memory_limit: "500m".into(),
            ..ResourceConfig::default()
        };
        assert!(!res.is_unconstrained());
    }

    #[test]
    fn volume_spec_parses_two_components() {
        let spec = VolumeSpec::parse("/host/data:/data").expect("valid spec");
        assert_eq!(spec.host, PathBuf::from("/host/data"));
        assert_eq!(spec.container, PathBuf::from("/data"));
    }

    #[test]
    fn volume_spec_rejects_malformed_input() {
        for bad in ["onlyonepart", ":/data", "/host:", "/a:/b:/c", ""] {
            assert!(VolumeSpec::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn volume_spec_rejects_parent_escape() {
        assert!(VolumeSpec::parse("/host:/../etc").is_err());
    }

    #[test]
    fn volume_target_stays_under_root() {
        let spec = VolumeSpec::parse("/host/data:/data/sub").unwrap();
        assert_eq!(
            spec.target_in(Path::new("/var/lib/hutch/mnt/web1")),
            PathBuf::from("/var/lib/hutch/mnt/web1/data/sub")
        );
    }

    #[test]
    fn id_mapping_parses_three_ids() {
        let map: IdMapping = "0:1000:1000".parse().unwrap();
        assert_eq!(map.container_id, 0);
        assert_eq!(map.host_uid, 1000);
        assert_eq!(map.host_gid, 1000);
        assert!("0:1000".parse::<IdMapping>().is_err());
        assert!("a:b:c".parse::<IdMapping>().is_err());
    }

    #[test]
    fn container_record_uses_wire_field_names() {
        let info = ContainerInfo::running(ContainerId::new("ABC"), "web1", 42, "top -b", None);
        let json: serde_json::Value = serde_json::to_value(&info).unwrap();
        assert_eq!(json["pid"], "42");
        assert_eq!(json["status"], "Running");
        assert!(json.get("creationTime").is_some());
        assert!(json.get("volume").is_none());
        assert!(json.get("startTime").is_none());
        assert_eq!(info.init_pid(), Some(42));

        let json = serde_json::to_value(info.with_start_time(Some(1234))).unwrap();
        assert_eq!(json["startTime"], 1234);
    }

    #[test]
    fn finished_record_has_blank_pid() {
        let mut info = ContainerInfo::running(ContainerId::new("ABC"), "web1", 42, "sh", None);
        info.finish(ContainerStatus::Stopped);
        assert_eq!(info.status, ContainerStatus::Stopped);
        assert!(info.pid.is_empty());
        assert_eq!(info.init_pid(), None);
        assert_eq!(info.start_time, None);
    }
}
