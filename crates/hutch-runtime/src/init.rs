//! Init handoff, the first code run inside a new container.
//!
//! Entered as `hutch init <name>` with the merge point as working
//! directory and the handoff pipe at [`HANDOFF_FD`]. Every step is fatal:
//! the process either becomes the user's program or exits non-zero.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use hutch_common::constants::HANDOFF_FD;
use hutch_common::error::{HutchError, Result};
use hutch_core::filesystem::mount::{mount_dev, mount_proc};
use hutch_core::filesystem::pivot_root::pivot_root;
use hutch_core::namespace::uts::set_hostname;

/// Runs the handoff protocol and replaces the process with the command.
///
/// 1. read the command from the pipe until end-of-file,
/// 2. set the hostname to the container name,
/// 3. pivot into the current directory,
/// 4. mount `/proc` and a `/dev` tmpfs,
/// 5. resolve the program on `PATH` and `execv(2)` it.
///
/// # Errors
///
/// Returns the first failing step; on success this never returns.
pub fn run_init(name: &str) -> Result<Infallible> {
    let argv = parse_command(&read_handoff()?)?;
    tracing::debug!(name, command = ?argv, "init received command");

    set_hostname(name)?;
    let new_root = std::env::current_dir().map_err(HutchError::io("."))?;
    pivot_root(&new_root)?;

    for (target, mount) in [
        ("/proc", mount_proc as fn(&Path) -> Result<()>),
        ("/dev", mount_dev),
    ] {
        std::fs::create_dir_all(target).map_err(HutchError::io(target))?;
        mount(Path::new(target))?;
    }

    let program = which::which(&argv[0]).map_err(|e| HutchError::NotFound {
        kind: "program",
        id: format!("{}: {e}", argv[0]),
    })?;
    let c_program = to_cstring(program.as_os_str().as_bytes())?;
    let c_args = argv
        .iter()
        .map(|arg| to_cstring(arg.as_bytes()))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(program = %program.display(), "exec");
    nix::unistd::execv(&c_program, &c_args).map_err(|e| HutchError::Syscall {
        call: "execv",
        message: format!("{}: {e}", program.display()),
    })
}

/// Splits a handoff command line on whitespace.
///
/// # Errors
///
/// Returns [`HutchError::Config`] when the command is blank.
pub fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
    if argv.is_empty() {
        return Err(HutchError::Config {
            message: "init received an empty command".into(),
        });
    }
    Ok(argv)
}

fn read_handoff() -> Result<String> {
    // SAFETY: the launcher places the read end of the handoff pipe at this
    // slot and nothing else in this process owns it.
    let mut pipe = unsafe { File::from_raw_fd(HANDOFF_FD) };
    let mut command = String::new();
    pipe.read_to_string(&mut command)
        .map_err(HutchError::io(format!("fd {HANDOFF_FD}")))?;
    Ok(command)
}

fn to_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| HutchError::Config {
        message: format!("{} contains a NUL byte", String::from_utf8_lossy(bytes)),
    })
}
