//! # hutch-core
//!
//! Low-level Linux isolation primitives for the hutch runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for new containers, uid/gid maps for the
//!   user namespace, and `setns(2)` for joining a running container.
//! - **Cgroups v1**: `cpu`, `cpuset`, and `memory` subsystem drivers behind
//!   one [`cgroup::CgroupManager`].
//! - **Filesystem**: base layer extraction, `OverlayFS` merge points, volume
//!   bind mounts, and `pivot_root`.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(not(target_os = "linux"))]
compile_error!("hutch-core requires Linux namespaces and cgroups");

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
