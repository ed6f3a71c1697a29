//! Detached container output.

use hutch_common::error::{HutchError, Result};

use crate::state::Registry;

/// Reads the log of container `name`.
///
/// Returns an empty string for a container that never wrote one, such as
/// an interactive run.
///
/// # Errors
///
/// Returns [`HutchError::NotFound`] for an unknown container, or an error
/// if the log exists but cannot be read.
pub fn read_logs(registry: &Registry, name: &str) -> Result<String> {
    let _ = registry.load(name)?;
    let path = registry.config().log_file(name)?;
    match std::fs::read(&path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(HutchError::Io { path, source: e }),
    }
}
