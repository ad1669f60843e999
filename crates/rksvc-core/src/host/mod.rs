//! Host probe and process-supervisor seams.
//!
//! Every call that inspects or mutates accounts, ownership, packages or the
//! supervisor goes through these traits. Directory, file and symlink work is
//! done with `std::fs` on the paths of the [`ServiceDefinition`].
//!
//! [`ServiceDefinition`]: crate::definition::ServiceDefinition

pub mod system;

use std::path::Path;
use std::time::Duration;

pub use system::{SystemHost, Systemctl};

/// Owner and group names of a filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
}

impl PackageManager {
    pub fn command(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
        }
    }
}

pub trait Host {
    fn effective_uid(&self) -> u32;

    /// Raw contents of `/etc/os-release`, if readable.
    fn os_release(&self) -> Option<String>;

    /// Whether `name` resolves on `PATH`.
    fn has_command(&self, name: &str) -> bool;

    /// Whether an executable file exists at an absolute path.
    fn is_executable(&self, path: &Path) -> bool;

    fn has_ca_bundle(&self) -> bool;

    fn install_packages(&self, manager: PackageManager, packages: &[&str]) -> anyhow::Result<()>;

    fn group_exists(&self, name: &str) -> bool;

    fn user_exists(&self, name: &str) -> bool;

    fn create_group(&self, name: &str) -> anyhow::Result<()>;

    /// Create a system account with no login shell and no home directory.
    fn create_user(&self, name: &str, group: &str) -> anyhow::Result<()>;

    fn delete_user(&self, name: &str) -> anyhow::Result<()>;

    fn delete_group(&self, name: &str) -> anyhow::Result<()>;

    /// Terminate every process owned by `name`. No processes is success.
    fn kill_user_processes(&self, name: &str) -> anyhow::Result<()>;

    fn owner(&self, path: &Path) -> anyhow::Result<Ownership>;

    fn set_owner(&self, path: &Path, owner: &Ownership) -> anyhow::Result<()>;

    /// First line printed by `binary --version`, if any.
    fn binary_version(&self, binary: &Path) -> Option<String>;

    /// Local addresses of sockets `pid` is listening on.
    fn listening_sockets(&self, pid: u32) -> anyhow::Result<Vec<String>>;

    /// Number of error-priority journal lines for `unit` within `window`.
    fn error_log_lines(&self, unit: &str, window: Duration) -> anyhow::Result<usize>;

    fn hostname(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAvailability {
    Operational,
    /// The control tool exists but the host was not booted with it.
    NotBooted,
    Missing,
}

pub trait Supervisor {
    fn availability(&self) -> SupervisorAvailability;

    fn daemon_reload(&self) -> anyhow::Result<()>;

    fn start(&self, unit: &str) -> anyhow::Result<()>;

    fn stop(&self, unit: &str) -> anyhow::Result<()>;

    fn restart(&self, unit: &str) -> anyhow::Result<()>;

    fn enable(&self, unit: &str) -> anyhow::Result<()>;

    fn disable(&self, unit: &str) -> anyhow::Result<()>;

    fn is_active(&self, unit: &str) -> bool;

    fn is_enabled(&self, unit: &str) -> bool;

    fn main_pid(&self, unit: &str) -> Option<u32>;

    fn memory_bytes(&self, unit: &str) -> Option<u64>;
}

/// Shared handles passed to every lifecycle step.
#[derive(Clone, Copy)]
pub struct LifecycleContext<'a> {
    pub definition: &'a crate::definition::ServiceDefinition,
    pub host: &'a dyn Host,
    pub supervisor: &'a dyn Supervisor,
}

impl<'a> LifecycleContext<'a> {
    pub fn new(
        definition: &'a crate::definition::ServiceDefinition,
        host: &'a dyn Host,
        supervisor: &'a dyn Supervisor,
    ) -> Self {
        Self {
            definition,
            host,
            supervisor,
        }
    }
}
