//! Container launcher.
//!
//! Clones the init process into fresh namespaces, hands it the user's
//! command through a pipe inherited at [`HANDOFF_FD`], and either waits
//! for it (interactive) or returns at once (detached).
//!
//! Parent-side order after `clone(2)`:
//! 1. write uid/gid maps when a user namespace is requested,
//! 2. record the container as `Running`,
//! 3. set and apply cgroup limits,
//! 4. write the command into the pipe and close it, releasing the child.

use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use hutch_common::constants::{BIN_NAME, HANDOFF_FD};
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerInfo, IdMapping, ResourceConfig};
use hutch_core::cgroup::CgroupManager;
use hutch_core::filesystem::rootfs::RootfsLayout;
use hutch_core::namespace::NamespaceConfig;
use hutch_core::namespace::user::write_id_maps;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sched::{CloneFlags, clone};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Pid, pipe2};

use crate::state::Registry;

const STACK_SIZE: usize = 1024 * 1024;
const SELF_EXE: &str = "/proc/self/exe";

/// Everything `run` needs to start a container.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Program and arguments to run inside the container.
    pub command: Vec<String>,
    /// Attach the container to the caller's terminal and wait for it.
    pub tty: bool,
    /// Requested name; defaults to the generated id.
    pub name: Option<String>,
    /// Optional `host:container` volume.
    pub volume: Option<String>,
    /// Resource limits.
    pub resources: ResourceConfig,
    /// Single-id mapping; enables the user namespace when set.
    pub user_map: Option<IdMapping>,
}

/// How a `run` ended from the launcher's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Interactive container finished and was cleaned up.
    Exited {
        /// Container name.
        name: String,
        /// Exit code, `128 + signal` for a signal death.
        code: i32,
    },
    /// Detached container left running.
    Detached {
        /// Container name.
        name: String,
        /// Host pid of the init process.
        pid: Pid,
    },
}

/// Runs a container.
///
/// # Errors
///
/// Any failure before the command is handed to the child is fatal: the
/// child is killed, and the rootfs, cgroup, and record are removed again.
pub fn run(registry: &Registry, opts: &RunOptions) -> Result<RunOutcome> {
    if opts.command.is_empty() {
        return Err(HutchError::Config {
            message: "no command given".into(),
        });
    }
    let config = registry.config();
    let (id, name) = registry.allocate(opts.name.as_deref())?;
    let layout = RootfsLayout::for_container(config, &name, opts.volume.as_deref())?;
    let cgroup = CgroupManager::for_container(&name, config);
    let command_line = opts.command.join(" ");

    let merge_point = layout.build()?;
    let launch = Launch {
        registry,
        layout: &layout,
        cgroup: &cgroup,
        name: &name,
    };

    let log = if opts.tty {
        None
    } else {
        Some(launch.guard(open_log(registry, &name))?)
    };
    let namespaces = if opts.user_map.is_some() {
        NamespaceConfig::with_user()
    } else {
        NamespaceConfig::default()
    };
    let (read_end, write_end) = launch.guard(cloexec_pipe())?;
    // In a user namespace the child must not exec before its id maps exist,
    // or it loses every capability it needs for the init sequence.
    let gate = match opts.user_map {
        Some(_) => Some(launch.guard(cloexec_pipe())?),
        None => None,
    };

    let child = launch.guard(spawn_init(
        &name,
        &merge_point,
        &read_end,
        log.as_ref(),
        gate.as_ref().map(|(wait, release)| (wait.as_raw_fd(), release.as_raw_fd())),
        namespaces.clone_flags(),
    ))?;
    drop(read_end);
    drop(log);
    let gate_release = gate.map(|(_, release)| release);
    tracing::info!(name = %name, pid = %child, "init process started");

    let info = ContainerInfo::running(id, &name, child.as_raw(), &command_line, opts.volume.clone())
        .with_start_time(start_time(child));
    let started = opts
        .user_map
        .as_ref()
        .map_or(Ok(()), |mapping| write_id_maps(child, mapping))
        .and_then(|()| registry.record_with(&info));
    if let Err(e) = started {
        launch.abort(Some(child));
        return Err(e);
    }
    drop(gate_release);

    if !opts.resources.is_unconstrained() {
        let _ = cgroup.set(&opts.resources);
    }
    let _ = cgroup.apply(child);

    if let Err(e) = send_command(write_end, &command_line) {
        launch.abort(Some(child));
        return Err(e);
    }

    if !opts.tty {
        tracing::info!(name = %name, pid = %child, "container detached");
        return Ok(RunOutcome::Detached { name, pid: child });
    }

    ignore_interrupts();
    let code = wait_exit_code(child);
    launch.cleanup();
    let code = code?;
    tracing::info!(name = %name, code, "container exited");
    Ok(RunOutcome::Exited { name, code })
}

/// Cleanup scope of one `run` call.
struct Launch<'a> {
    registry: &'a Registry,
    layout: &'a RootfsLayout,
    cgroup: &'a CgroupManager,
    name: &'a str,
}

impl Launch<'_> {
    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.abort(None);
        }
        result
    }

    fn abort(&self, child: Option<Pid>) {
        if let Some(pid) = child {
            tracing::error!(name = self.name, %pid, "launch failed, killing init process");
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
        }
        self.cleanup();
    }

    fn cleanup(&self) {
        let _ = self.layout.teardown();
        let _ = self.cgroup.destroy();
        if let Err(e) = self.registry.delete(self.name) {
            tracing::warn!(name = self.name, error = %e, "could not delete container record");
        }
    }
}

fn open_log(registry: &Registry, name: &str) -> Result<File> {
    let dir = registry.config().container_dir(name)?;
    std::fs::create_dir_all(&dir).map_err(HutchError::io(&dir))?;
    let path = registry.config().log_file(name)?;
    File::create(&path).map_err(HutchError::io(&path))
}

/// Clones the init process.
///
/// The child only runs async-signal-safe libc calls: it waits for `gate`
/// to reach end-of-file when one is given, moves the pipe to
/// [`HANDOFF_FD`], redirects stdio in detached mode, enters the merge
/// point, and re-executes this binary as `hutch init <name>`. Everything
/// it touches is allocated before `clone(2)`.
fn spawn_init(
    name: &str,
    merge_point: &Path,
    handoff: &OwnedFd,
    log: Option<&File>,
    gate: Option<(RawFd, RawFd)>,
    flags: CloneFlags,
) -> Result<Pid> {
    let to_cstring = |bytes: &[u8]| {
        CString::new(bytes).map_err(|_| HutchError::Config {
            message: format!("{} contains a NUL byte", String::from_utf8_lossy(bytes)),
        })
    };
    let exe = to_cstring(SELF_EXE.as_bytes())?;
    let workdir = to_cstring(merge_point.as_os_str().as_bytes())?;
    let argv = [BIN_NAME, "init", name]
        .iter()
        .map(|arg| to_cstring(arg.as_bytes()))
        .collect::<Result<Vec<_>>>()?;
    let argv_ptrs: Vec<*const libc::c_char> = argv
        .iter()
        .map(|arg| arg.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();

    let devnull = File::open("/dev/null").map_err(HutchError::io("/dev/null"))?;
    let handoff_fd = handoff.as_raw_fd();
    let stdio: Option<(RawFd, RawFd)> = log.map(|log| (log.as_raw_fd(), devnull.as_raw_fd()));

    let child_main = Box::new(|| -> isize {
        // SAFETY: the child owns a private copy of the parent's memory; all
        // pointers reference buffers built above and every call is a plain
        // libc syscall wrapper on descriptors that are open in the child.
        unsafe {
            if let Some((wait, release)) = gate {
                let mut byte = 0_u8;
                let _ = libc::close(release);
                if libc::read(wait, (&raw mut byte).cast(), 1) < 0 {
                    return 1;
                }
            }
            if let Some((out, null)) = stdio {
                if libc::dup2(out, libc::STDOUT_FILENO) < 0
                    || libc::dup2(out, libc::STDERR_FILENO) < 0
                    || libc::dup2(null, libc::STDIN_FILENO) < 0
                {
                    return 1;
                }
            }
            let moved = if handoff_fd == HANDOFF_FD {
                libc::fcntl(HANDOFF_FD, libc::F_SETFD, 0)
            } else {
                libc::dup2(handoff_fd, HANDOFF_FD)
            };
            if moved < 0 || libc::chdir(workdir.as_ptr()) != 0 {
                return 1;
            }
            libc::execv(exe.as_ptr(), argv_ptrs.as_ptr());
        }
        127
    });

    let mut stack = vec![0_u8; STACK_SIZE];
    // SAFETY: without CLONE_VM the child runs on a copy of `stack` and of
    // the heap, and it never returns into Rust code that could observe
    // state shared with the parent.
    let pid = unsafe { clone(child_main, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| clone_error(flags, e))?;
    Ok(pid)
}

/// Namespace creation needs `CAP_SYS_ADMIN`; a refusal is reported as such.
fn clone_error(flags: CloneFlags, errno: Errno) -> HutchError {
    match errno {
        Errno::EPERM => HutchError::PermissionDenied {
            message: format!("creating namespaces {flags:?} requires root (CAP_SYS_ADMIN)"),
        },
        e => HutchError::Syscall {
            call: "clone",
            message: format!("{flags:?}: {e}"),
        },
    }
}

fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    pipe2(OFlag::O_CLOEXEC).map_err(|e| HutchError::Syscall {
        call: "pipe",
        message: e.to_string(),
    })
}

fn send_command(write_end: OwnedFd, command_line: &str) -> Result<()> {
    let mut pipe = File::from(write_end);
    pipe.write_all(command_line.as_bytes())
        .map_err(|e| HutchError::Syscall {
            call: "write",
            message: format!("handoff pipe: {e}"),
        })?;
    tracing::debug!(command = command_line, "command handed to init");
    Ok(())
}

fn ignore_interrupts() {
    if let Err(e) = ctrlc::set_handler(|| tracing::debug!("interrupt ignored while container runs")) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
}

fn wait_exit_code(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(HutchError::Syscall {
                    call: "waitpid",
                    message: format!("{pid}: {e}"),
                });
            }
        }
    }
}

/// Returns whether `pid` is a live process.
///
/// A zombie counts as dead: it has exited and only waits to be reaped.
#[must_use]
pub fn is_alive(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) | Err(Errno::EPERM) => {}
        Err(_) => return false,
    }
    procfs::process::Process::new(pid.as_raw())
        .and_then(|p| p.stat())
        .map_or(true, |stat| stat.state != 'Z')
}

/// Start time of `pid` in clock ticks after boot, `None` if it is gone.
#[must_use]
pub fn start_time(pid: Pid) -> Option<u64> {
    procfs::process::Process::new(pid.as_raw())
        .and_then(|p| p.stat())
        .map(|stat| stat.starttime)
        .ok()
}

/// Returns whether `pid` is still the process that started at `recorded`.
///
/// Without a recorded start time the pid is trusted as is.
#[must_use]
pub fn is_same_process(pid: Pid, recorded: Option<u64>) -> bool {
    recorded.is_none_or(|ticks| start_time(pid) == Some(ticks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(is_alive(Pid::this()));
    }

    #[test]
    fn missing_process_is_dead() {
        assert!(!is_alive(Pid::from_raw(i32::MAX)));
    }

    #[test]
    fn zombie_is_dead() {
        let mut child = std::process::Command::new("true").spawn().expect("spawn true");
        let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits"));
        for _ in 0..200 {
            if !is_alive(pid) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(!is_alive(pid));
        let _ = child.wait();
    }

    #[test]
    fn start_time_identifies_a_process() {
        let own = start_time(Pid::this()).expect("own stat");
        assert!(is_same_process(Pid::this(), Some(own)));
        assert!(!is_same_process(Pid::this(), Some(own + 1)));
        assert!(is_same_process(Pid::this(), None));
        assert_eq!(start_time(Pid::from_raw(i32::MAX)), None);
    }

    #[test]
    fn empty_command_is_rejected_before_any_setup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::new(hutch_common::config::HutchConfig::with_dirs(
            dir.path().join("run"),
            dir.path().join("data"),
        ));
        let err = run(&registry, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, HutchError::Config { .. }));
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn clone_refusal_is_a_permission_error() {
        let flags = NamespaceConfig::default().clone_flags();
        assert!(matches!(
            clone_error(flags, Errno::EPERM),
            HutchError::PermissionDenied { .. }
        ));
        assert!(matches!(
            clone_error(flags, Errno::ENOMEM),
            HutchError::Syscall { call: "clone", .. }
        ));
    }

    #[test]
    fn command_is_written_and_pipe_closed() {
        let (read_end, write_end) = cloexec_pipe().expect("pipe");
        send_command(write_end, "echo hello").expect("send");
        let mut out = String::new();
        std::io::Read::read_to_string(&mut File::from(read_end), &mut out).expect("read");
        assert_eq!(out, "echo hello");
    }
}
