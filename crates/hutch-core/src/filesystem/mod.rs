//! Filesystem management for container isolation.
//!
//! Provides base layer extraction, `OverlayFS` merge points, volume bind
//! mounts, the per-container [`rootfs::RootfsLayout`], and the
//! `pivot_root` sequence run inside the new mount namespace.

pub mod layer;
pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
pub mod rootfs;
