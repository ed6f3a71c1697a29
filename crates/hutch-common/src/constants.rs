//! System-wide constants and default paths.

/// Default root of per-container metadata directories.
pub const DEFAULT_RUN_DIR: &str = "/var/run/hutch";

/// Default root of image layers, write layers, and merge points.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/hutch";

/// File name of the base image archive inside the data directory.
pub const BASE_IMAGE_ARCHIVE: &str = "busybox.tar";

/// Metadata record file name inside a container directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Detached-mode output file name inside a container directory.
pub const LOG_FILE_NAME: &str = "container.log";

/// Parent cgroup under which every container cgroup is created.
pub const CGROUP_PARENT: &str = "hutch";

/// Longest container name, bounded by the kernel's hostname limit
/// (`HOST_NAME_MAX`) since the name becomes the container hostname.
pub const MAX_NAME_LEN: usize = 64;

/// Descriptor slot the init process reads its command from.
///
/// First slot after stdin, stdout, and stderr.
pub const HANDOFF_FD: i32 = 3;

/// Environment variable carrying the target pid into the exec helper.
pub const ENV_EXEC_PID: &str = "HUTCH_EXEC_PID";

/// Environment variable carrying the command string into the exec helper.
pub const ENV_EXEC_CMD: &str = "HUTCH_EXEC_CMD";

/// Namespaces joined by the exec helper, in join order.
pub const EXEC_NAMESPACES: [&str; 5] = ["ipc", "uts", "net", "pid", "mnt"];

/// Hidden directory inside the new root that receives the old root.
pub const PIVOT_DIR_NAME: &str = ".pivot_root";

/// Default grace period between SIGTERM and SIGKILL on stop.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Record timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "hutch";
