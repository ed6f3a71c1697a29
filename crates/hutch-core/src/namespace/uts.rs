//! UTS namespace hostname.

use hutch_common::error::{HutchError, Result};

/// Sets the hostname inside the container's UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| HutchError::Syscall {
        call: "sethostname",
        message: format!("{hostname}: {e}"),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
