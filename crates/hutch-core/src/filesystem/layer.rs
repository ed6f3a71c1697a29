//! Shared read-only base layer.
//!
//! The base image archive is unpacked once into the base directory and
//! reused by every container afterwards.

use std::path::Path;

use hutch_common::error::{HutchError, Result};

/// Ensures the base layer exists at `target`, extracting `archive` once.
///
/// Returns `true` when extraction happened and `false` when the directory
/// was already present. A failed extraction removes the partial directory
/// so the next call retries from scratch.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or unpacked.
pub fn ensure_base_layer(archive: &Path, target: &Path) -> Result<bool> {
    if target.exists() {
        tracing::debug!(target = %target.display(), "base layer present, skipping extraction");
        return Ok(false);
    }
    if let Err(e) = extract_layer(archive, target) {
        if let Err(cleanup) = std::fs::remove_dir_all(target) {
            tracing::warn!(target = %target.display(), error = %cleanup, "partial base layer left behind");
        }
        return Err(e);
    }
    Ok(true)
}

/// Extracts a tar archive to the target directory.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or unpacked.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<()> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting base layer"
    );

    let file = std::fs::File::open(archive_path).map_err(HutchError::io(archive_path))?;
    std::fs::create_dir_all(target).map_err(HutchError::io(target))?;

    if is_gzip_archive(archive_path) {
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder)
            .unpack(target)
            .map_err(HutchError::io(target))?;
    } else {
        tar::Archive::new(file)
            .unpack(target)
            .map_err(HutchError::io(target))?;
    }

    tracing::info!(target = %target.display(), "base layer extracted");
    Ok(())
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tar(dir: &Path) -> std::path::PathBuf {
        let tar_path = dir.join("busybox.tar");
        let file = std::fs::File::create(&tar_path).expect("failed to create tar file");
        let mut builder = tar::Builder::new(file);
        let data = b"#!/bin/sh\necho hello\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "bin/echo-hello", &data[..])
            .expect("failed to append data");
        builder.finish().expect("failed to finish tar");
        tar_path
    }

    #[test]
    fn first_call_extracts_the_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = create_test_tar(dir.path());
        let base = dir.path().join("base");

        assert!(ensure_base_layer(&archive, &base).expect("extract"));
        assert!(base.join("bin/echo-hello").exists());
    }

    #[test]
    fn existing_base_layer_is_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = create_test_tar(dir.path());
        let base = dir.path().join("base");
        assert!(ensure_base_layer(&archive, &base).expect("first"));
        std::fs::write(base.join("marker"), "kept").unwrap();

        assert!(!ensure_base_layer(&archive, &base).expect("second"));
        assert!(base.join("marker").exists());
    }

    #[test]
    fn missing_archive_fails_without_leaving_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("base");
        let result = ensure_base_layer(&dir.path().join("missing.tar"), &base);
        assert!(result.is_err());
        assert!(!base.exists());
    }

    #[test]
    fn gzip_archives_are_detected_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tar_gz = dir.path().join("busybox.tar.gz");
        let file = std::fs::File::create(&tar_gz).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let data = b"gz";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "etc/gz", &data[..]).unwrap();
        let _ = builder.into_inner().unwrap().finish().unwrap();

        extract_layer(&tar_gz, &dir.path().join("out")).expect("extract");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/etc/gz")).unwrap(),
            "gz"
        );
        assert!(!is_gzip_archive(Path::new("busybox.tar")));
    }
}
