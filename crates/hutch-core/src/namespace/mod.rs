//! Linux namespace management for container isolation.
//!
//! New containers get their namespaces from the `clone(2)` flags built
//! here; [`join`] re-enters the namespaces of a running container with
//! `setns(2)`.

pub mod join;
pub mod user;
pub mod uts;

use nix::sched::CloneFlags;

/// Configuration for which namespaces a new container gets.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate user namespace.
    pub user: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
}

impl Default for NamespaceConfig {
    /// Every namespace except the user namespace, which needs an id mapping.
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            user: false,
            ipc: true,
            uts: true,
        }
    }
}

impl NamespaceConfig {
    /// Default set plus a user namespace.
    #[must_use]
    pub fn with_user() -> Self {
        Self {
            user: true,
            ..Self::default()
        }
    }

    /// Translates the configuration into `clone(2)` flags.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        [
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
            (self.user, CloneFlags::CLONE_NEWUSER),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(CloneFlags::empty(), |acc, (_, flag)| acc | flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_isolates_everything_but_users() {
        let flags = NamespaceConfig::default().clone_flags();
        assert!(flags.contains(
            CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
        ));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn user_mode_adds_newuser() {
        assert!(
            NamespaceConfig::with_user()
                .clone_flags()
                .contains(CloneFlags::CLONE_NEWUSER)
        );
    }

    #[test]
    fn disabled_namespaces_are_left_out() {
        let config = NamespaceConfig {
            network: false,
            ..NamespaceConfig::default()
        };
        assert!(!config.clone_flags().contains(CloneFlags::CLONE_NEWNET));
    }
}
