//! Per-container layered root filesystem.
//!
//! Layout for a container named `web1`:
//!
//! ```text
//! <data_dir>/base              shared read-only layer (never removed here)
//! <data_dir>/layers/web1/upper writable layer
//! <data_dir>/layers/web1/work  overlay work directory
//! <data_dir>/mnt/web1          merge point the container pivots into
//! ```

use std::path::{Path, PathBuf};

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::VolumeSpec;

use super::layer::ensure_base_layer;
use super::mount::{bind_mount, is_mount_point, unmount};
use super::overlayfs::{OverlayConfig, mount_overlay};

/// Paths making up one container's root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootfsLayout {
    /// Archive the base layer is extracted from.
    pub base_archive: PathBuf,
    /// Shared read-only base layer.
    pub base_dir: PathBuf,
    /// Writable layer owned by this container.
    pub write_layer: PathBuf,
    /// Merge point owned by this container.
    pub merge_point: PathBuf,
    /// Raw `host:container` volume spec, as given by the user.
    pub volume: Option<String>,
}

impl RootfsLayout {
    /// Computes the layout of container `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid container name.
    pub fn for_container(config: &HutchConfig, name: &str, volume: Option<&str>) -> Result<Self> {
        Ok(Self {
            base_archive: config.base_image.clone(),
            base_dir: config.base_dir(),
            write_layer: config.write_layer(name)?,
            merge_point: config.merge_point(name)?,
            volume: volume.filter(|v| !v.is_empty()).map(str::to_owned),
        })
    }

    /// Upper directory of the overlay.
    #[must_use]
    pub fn upper_dir(&self) -> PathBuf {
        self.write_layer.join("upper")
    }

    /// Work directory of the overlay.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.write_layer.join("work")
    }

    /// Parsed volume binding; malformed specs are logged and yield `None`.
    #[must_use]
    pub fn volume_spec(&self) -> Option<VolumeSpec> {
        let raw = self.volume.as_deref()?;
        match VolumeSpec::parse(raw) {
            Ok(spec) => Some(spec),
            Err(e) => {
                tracing::warn!(volume = raw, error = %e, "ignoring malformed volume");
                None
            }
        }
    }

    /// Returns whether any per-container part still exists on disk.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.merge_point.exists() || self.write_layer.exists()
    }

    /// Builds the merged root filesystem and returns the merge point.
    ///
    /// Extracts the base layer on first use, creates the writable layer,
    /// mounts the overlay, and bind-mounts the volume when one is given.
    /// A failure after the overlay is mounted tears everything down again.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction, directory creation, or any mount fails.
    pub fn build(&self) -> Result<PathBuf> {
        let _ = ensure_base_layer(&self.base_archive, &self.base_dir)?;

        let overlay = OverlayConfig {
            lower_dirs: vec![self.base_dir.clone()],
            upper_dir: self.upper_dir(),
            work_dir: self.work_dir(),
            merged_dir: self.merge_point.clone(),
        };
        if let Err(e) = mount_overlay(&overlay) {
            let _ = self.teardown();
            return Err(e);
        }

        if let Some(spec) = self.volume_spec() {
            if let Err(e) = self.mount_volume(&spec) {
                let _ = self.teardown();
                return Err(e);
            }
        }

        tracing::info!(merge_point = %self.merge_point.display(), "rootfs ready");
        Ok(self.merge_point.clone())
    }

    fn mount_volume(&self, spec: &VolumeSpec) -> Result<()> {
        let target = spec.target_in(&self.merge_point);
        for dir in [spec.host.as_path(), target.as_path()] {
            std::fs::create_dir_all(dir).map_err(HutchError::io(dir))?;
        }
        bind_mount(&spec.host, &target)?;
        tracing::info!(volume = %spec, "volume mounted");
        Ok(())
    }

    /// Tears the root filesystem down in reverse order of [`Self::build`].
    ///
    /// The volume bind is unmounted before the merge point it is nested
    /// under. A directory is only deleted once nothing is mounted on it or
    /// below it, so host volume data is never reached through a live bind.
    /// The shared base layer is never touched. Failures are logged and
    /// returned; teardown always runs to the end.
    pub fn teardown(&self) -> Vec<HutchError> {
        let mut failures = Vec::new();
        let volume_target = self.volume_spec().map(|spec| spec.target_in(&self.merge_point));

        if let Some(target) = &volume_target {
            record(&mut failures, unmount(target, false).map(drop));
        }
        record(&mut failures, unmount(&self.merge_point, true).map(drop));

        let mounted = [Some(&self.merge_point), volume_target.as_ref()]
            .into_iter()
            .flatten()
            .any(|p| is_mount_point(p).unwrap_or(true));
        if mounted {
            failures.push(HutchError::Syscall {
                call: "umount",
                message: format!(
                    "{} is still mounted, leaving container layers in place",
                    self.merge_point.display()
                ),
            });
        } else {
            record(&mut failures, remove_dir(&self.merge_point));
            record(&mut failures, remove_dir(&self.write_layer));
        }

        for failure in &failures {
            tracing::warn!(error = %failure, "rootfs teardown incomplete");
        }
        if failures.is_empty() {
            tracing::info!(merge_point = %self.merge_point.display(), "rootfs removed");
        }
        failures
    }
}

fn record(failures: &mut Vec<HutchError>, result: Result<()>) {
    if let Err(e) = result {
        failures.push(e);
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(HutchError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}
