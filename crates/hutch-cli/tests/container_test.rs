//! Full container lifecycle through the `hutch` binary.
//!
//! These tests create namespaces, overlay mounts and cgroups, so they need
//! root on a host with cgroup v1 hierarchies under `/sys/fs/cgroup`. Run
//! them with `cargo test -p hutch-cli -- --ignored`.
//!
//! The base image is assembled from the host's own `sh`, `echo` and
//! `sleep` plus the shared libraries `ldd` reports for them.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const TOOLS: [&str; 3] = ["sh", "echo", "sleep"];

struct Host {
    dir: tempfile::TempDir,
}

impl Host {
    fn new() -> Self {
        let host = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        write_base_image(&host.base_image());
        host
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn base_image(&self) -> PathBuf {
        self.dir.path().join("base.tar")
    }

    fn hutch(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_hutch"))
            .args(args)
            .env("HUTCH_RUN_DIR", self.dir.path().join("run"))
            .env("HUTCH_DATA_DIR", self.data_dir())
            .env("HUTCH_BASE_IMAGE", self.base_image())
            .env("HUTCH_CGROUP_ROOT", CGROUP_ROOT)
            .env("HUTCH_STOP_TIMEOUT", "1")
            .stdin(Stdio::null())
            .output()
            .expect("spawn hutch")
    }

    fn hutch_ok(&self, args: &[&str]) -> String {
        let out = self.hutch(args);
        assert!(
            out.status.success(),
            "hutch {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8(out.stdout).expect("utf-8 output")
    }

    /// Asserts that nothing of container `name` is left on the host.
    fn assert_clean(&self, name: &str) {
        let data = self.data_dir();
        assert!(!data.join("mnt").join(name).exists(), "merge point left");
        assert!(!data.join("layers").join(name).exists(), "write layer left");
        assert!(data.join("base").exists(), "base layer must survive");
        for subsystem in ["cpu", "cpuset", "memory"] {
            let cgroup = Path::new(CGROUP_ROOT).join(subsystem).join("hutch").join(name);
            assert!(!cgroup.exists(), "{} left", cgroup.display());
        }
        let mounts = std::fs::read_to_string("/proc/self/mountinfo").unwrap();
        assert!(
            !mounts.contains(&*data.to_string_lossy()),
            "mounts left under {}",
            data.display()
        );
        assert!(!self.hutch_ok(&["ps"]).contains(name));
    }
}

fn write_base_image(path: &Path) {
    let mut files = BTreeSet::new();
    let mut builder = tar::Builder::new(std::fs::File::create(path).unwrap());
    for tool in TOOLS {
        let host_path = ["/bin", "/usr/bin"]
            .iter()
            .map(|dir| Path::new(dir).join(tool))
            .find(|p| p.exists())
            .unwrap_or_else(|| panic!("{tool} not found on host"));
        builder
            .append_path_with_name(&host_path, Path::new("bin").join(tool))
            .unwrap();
        files.extend(shared_libraries(&host_path));
    }
    for lib in files {
        let inside = lib.strip_prefix("/").unwrap().to_path_buf();
        builder.append_path_with_name(&lib, inside).unwrap();
    }
    builder.finish().unwrap();
}

fn shared_libraries(binary: &Path) -> Vec<PathBuf> {
    let out = Command::new("ldd").arg(binary).output().expect("run ldd");
    String::from_utf8_lossy(&out.stdout)
        .split_whitespace()
        .filter(|token| token.starts_with('/'))
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect()
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

// ── Interactive ──────────────────────────────────────────────────────

#[test]
#[ignore = "requires root and cgroup v1"]
fn interactive_echo_prints_and_cleans_up() {
    let host = Host::new();
    let out = host.hutch_ok(&["run", "-t", "-m", "500m", "--name", "e2e-fg", "echo", "hello"]);
    assert_eq!(out, "hello\n");
    host.assert_clean("e2e-fg");
}

#[test]
#[ignore = "requires root and cgroup v1"]
fn interactive_exit_code_is_forwarded() {
    let host = Host::new();
    let out = host.hutch(&["run", "-t", "--name", "e2e-code", "sh", "-c", "false"]);
    assert_eq!(out.status.code(), Some(1));
    host.assert_clean("e2e-code");
}

// ── Detached, exec, stop, remove ─────────────────────────────────────

#[test]
#[ignore = "requires root and cgroup v1"]
fn detached_container_is_limited_reachable_and_removable() {
    let host = Host::new();
    let name = "e2e-bg";
    let printed = host.hutch_ok(&["run", "-d", "-m", "500m", "--name", name, "sleep", "30"]);
    assert_eq!(printed.trim(), name);

    let limit = Path::new(CGROUP_ROOT).join("memory/hutch").join(name).join("memory.limit_in_bytes");
    assert_eq!(std::fs::read_to_string(limit).unwrap().trim(), "524288000");

    let ps = host.hutch_ok(&["ps"]);
    let row = ps.lines().find(|l| l.contains(name)).expect("listed");
    assert!(row.contains("Running"));

    let hostname = host.hutch_ok(&["exec", name, "read h < /proc/sys/kernel/hostname; echo $h"]);
    assert_eq!(hostname.trim(), name);

    let out = host.hutch(&["rm", name]);
    assert!(!out.status.success(), "running container must not be removable");

    let _ = host.hutch_ok(&["stop", name]);
    let ps = host.hutch_ok(&["ps"]);
    assert!(ps.lines().any(|l| l.contains(name) && l.contains("Stopped")));

    let _ = host.hutch_ok(&["rm", name]);
    host.assert_clean(name);
}

#[test]
#[ignore = "requires root and cgroup v1"]
fn detached_output_lands_in_the_log() {
    let host = Host::new();
    let name = "e2e-log";
    let _ = host.hutch_ok(&["run", "-d", "--name", name, "echo", "logged"]);

    assert!(wait_until(Duration::from_secs(5), || {
        host.hutch_ok(&["logs", name]).contains("logged")
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        host.hutch_ok(&["ps"]).lines().any(|l| l.contains(name) && l.contains("Exited"))
    }));

    let _ = host.hutch_ok(&["stop", name]);
    let _ = host.hutch_ok(&["rm", name]);
    host.assert_clean(name);
}

#[test]
#[ignore = "requires root and cgroup v1"]
fn volume_is_visible_and_host_data_survives_removal() {
    let host = Host::new();
    let shared = host.dir.path().join("shared");
    std::fs::create_dir_all(&shared).unwrap();
    std::fs::write(shared.join("keep"), "precious").unwrap();
    let volume = format!("{}:/data", shared.display());
    let name = "e2e-vol";

    let _ = host.hutch_ok(&["run", "-d", "-v", &volume, "--name", name, "sleep", "30"]);
    let seen = host.hutch_ok(&["exec", name, "read v < /data/keep; echo $v"]);
    assert_eq!(seen.trim(), "precious");

    let _ = host.hutch_ok(&["stop", name]);
    let _ = host.hutch_ok(&["rm", name]);
    host.assert_clean(name);
    assert_eq!(std::fs::read_to_string(shared.join("keep")).unwrap(), "precious");
}
