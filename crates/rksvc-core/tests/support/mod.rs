//! In-memory host and supervisor for exercising lifecycle commands against a
//! scratch directory.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rksvc_core::definition::ServiceDefinition;
use rksvc_core::host::{
    Host, LifecycleContext, Ownership, PackageManager, Supervisor, SupervisorAvailability,
};
use tempfile::TempDir;

pub const UBUNTU_2204: &str = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\nPRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\n";

pub struct FakeHost {
    pub euid: Cell<u32>,
    pub os_release: RefCell<Option<String>>,
    pub commands: RefCell<BTreeSet<String>>,
    pub ca_bundle: Cell<bool>,
    pub installed_packages: RefCell<Vec<String>>,
    /// account name -> primary group
    pub users: RefCell<BTreeMap<String, String>>,
    pub groups: RefCell<BTreeSet<String>>,
    pub owners: RefCell<BTreeMap<PathBuf, Ownership>>,
    /// Every path passed to `set_owner`, in call order.
    pub chowned: RefCell<Vec<PathBuf>>,
    /// Executables outside the scratch root, with their `--version` line.
    pub external_binaries: RefCell<BTreeMap<PathBuf, Option<String>>>,
    pub sockets: RefCell<Vec<String>>,
    pub error_lines: Cell<usize>,
    pub killed: RefCell<Vec<String>>,
    pub accounts_created: Cell<usize>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            euid: Cell::new(0),
            os_release: RefCell::new(Some(UBUNTU_2204.to_string())),
            commands: RefCell::new(
                ["curl", "systemctl", "apt-get"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            ca_bundle: Cell::new(true),
            installed_packages: RefCell::new(Vec::new()),
            users: RefCell::new(BTreeMap::from([("root".to_string(), "root".to_string())])),
            groups: RefCell::new(BTreeSet::from(["root".to_string()])),
            owners: RefCell::new(BTreeMap::new()),
            chowned: RefCell::new(Vec::new()),
            external_binaries: RefCell::new(BTreeMap::new()),
            sockets: RefCell::new(Vec::new()),
            error_lines: Cell::new(0),
            killed: RefCell::new(Vec::new()),
            accounts_created: Cell::new(0),
        }
    }
}

impl FakeHost {
    pub fn with_engine(self, path: &str, version: Option<&str>) -> Self {
        self.external_binaries
            .borrow_mut()
            .insert(PathBuf::from(path), version.map(String::from));
        self
    }

    pub fn add_account(&self, name: &str, group: &str) {
        self.groups.borrow_mut().insert(group.to_string());
        self.users
            .borrow_mut()
            .insert(name.to_string(), group.to_string());
    }
}

impl Host for FakeHost {
    fn effective_uid(&self) -> u32 {
        self.euid.get()
    }

    fn os_release(&self) -> Option<String> {
        self.os_release.borrow().clone()
    }

    fn has_command(&self, name: &str) -> bool {
        self.commands.borrow().contains(name)
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.external_binaries.borrow().contains_key(path)
    }

    fn has_ca_bundle(&self) -> bool {
        self.ca_bundle.get()
    }

    fn install_packages(&self, _manager: PackageManager, packages: &[&str]) -> anyhow::Result<()> {
        for package in packages {
            self.installed_packages.borrow_mut().push(package.to_string());
            if *package == "curl" {
                self.commands.borrow_mut().insert("curl".to_string());
            }
            if *package == "ca-certificates" {
                self.ca_bundle.set(true);
            }
        }
        Ok(())
    }

    fn group_exists(&self, name: &str) -> bool {
        self.groups.borrow().contains(name)
    }

    fn user_exists(&self, name: &str) -> bool {
        self.users.borrow().contains_key(name)
    }

    fn create_group(&self, name: &str) -> anyhow::Result<()> {
        self.groups.borrow_mut().insert(name.to_string());
        Ok(())
    }

    fn create_user(&self, name: &str, group: &str) -> anyhow::Result<()> {
        if !self.group_exists(group) {
            anyhow::bail!("useradd: group '{group}' does not exist");
        }
        if self.users.borrow().contains_key(name) {
            anyhow::bail!("useradd: user '{name}' already exists");
        }
        self.users
            .borrow_mut()
            .insert(name.to_string(), group.to_string());
        self.accounts_created.set(self.accounts_created.get() + 1);
        Ok(())
    }

    fn delete_user(&self, name: &str) -> anyhow::Result<()> {
        self.users.borrow_mut().remove(name);
        Ok(())
    }

    fn delete_group(&self, name: &str) -> anyhow::Result<()> {
        self.groups.borrow_mut().remove(name);
        Ok(())
    }

    fn kill_user_processes(&self, name: &str) -> anyhow::Result<()> {
        self.killed.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn owner(&self, path: &Path) -> anyhow::Result<Ownership> {
        if std::fs::symlink_metadata(path).is_err() {
            anyhow::bail!("No such file: {}", path.display());
        }
        Ok(self
            .owners
            .borrow()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Ownership::new("root", "root")))
    }

    fn set_owner(&self, path: &Path, owner: &Ownership) -> anyhow::Result<()> {
        if !self.user_exists(&owner.user) {
            anyhow::bail!("No such user: {}", owner.user);
        }
        if !self.group_exists(&owner.group) {
            anyhow::bail!("No such group: {}", owner.group);
        }
        if std::fs::symlink_metadata(path).is_err() {
            anyhow::bail!("No such file: {}", path.display());
        }
        self.chowned.borrow_mut().push(path.to_path_buf());
        self.owners
            .borrow_mut()
            .insert(path.to_path_buf(), owner.clone());
        Ok(())
    }

    fn binary_version(&self, binary: &Path) -> Option<String> {
        if let Some(version) = self.external_binaries.borrow().get(binary) {
            return version.clone();
        }
        let content = std::fs::read_to_string(binary).ok()?;
        content
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
    }

    fn listening_sockets(&self, _pid: u32) -> anyhow::Result<Vec<String>> {
        Ok(self.sockets.borrow().clone())
    }

    fn error_log_lines(&self, _unit: &str, _window: Duration) -> anyhow::Result<usize> {
        Ok(self.error_lines.get())
    }

    fn hostname(&self) -> String {
        "test-host".to_string()
    }
}

pub struct FakeSupervisor {
    pub availability: Cell<SupervisorAvailability>,
    pub active: Cell<bool>,
    pub enabled: Cell<bool>,
    pub memory: Cell<Option<u64>>,
    pub calls: RefCell<Vec<String>>,
}

impl Default for FakeSupervisor {
    fn default() -> Self {
        Self {
            availability: Cell::new(SupervisorAvailability::Operational),
            active: Cell::new(false),
            enabled: Cell::new(false),
            memory: Cell::new(Some(64 * 1024 * 1024)),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl FakeSupervisor {
    fn record(&self, call: &str) {
        self.calls.borrow_mut().push(call.to_string());
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }
}

impl Supervisor for FakeSupervisor {
    fn availability(&self) -> SupervisorAvailability {
        self.availability.get()
    }

    fn daemon_reload(&self) -> anyhow::Result<()> {
        self.record("daemon-reload");
        Ok(())
    }

    fn start(&self, _unit: &str) -> anyhow::Result<()> {
        self.record("start");
        self.active.set(true);
        Ok(())
    }

    fn stop(&self, _unit: &str) -> anyhow::Result<()> {
        self.record("stop");
        self.active.set(false);
        Ok(())
    }

    fn restart(&self, _unit: &str) -> anyhow::Result<()> {
        self.record("restart");
        self.active.set(true);
        Ok(())
    }

    fn enable(&self, _unit: &str) -> anyhow::Result<()> {
        self.record("enable");
        self.enabled.set(true);
        Ok(())
    }

    fn disable(&self, _unit: &str) -> anyhow::Result<()> {
        self.record("disable");
        self.enabled.set(false);
        Ok(())
    }

    fn is_active(&self, _unit: &str) -> bool {
        self.active.get()
    }

    fn is_enabled(&self, _unit: &str) -> bool {
        self.enabled.get()
    }

    fn main_pid(&self, _unit: &str) -> Option<u32> {
        self.active.get().then_some(4242)
    }

    fn memory_bytes(&self, _unit: &str) -> Option<u64> {
        if self.active.get() {
            self.memory.get()
        } else {
            None
        }
    }
}

/// A scratch root with a definition re-based into it.
pub struct Harness {
    pub temp: TempDir,
    pub definition: ServiceDefinition,
    pub host: FakeHost,
    pub supervisor: FakeSupervisor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_host(FakeHost::default())
    }

    pub fn with_host(host: FakeHost) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let definition = ServiceDefinition::reasonkit().rooted_at(temp.path());
        Self {
            temp,
            definition,
            host,
            supervisor: FakeSupervisor::default(),
        }
    }

    pub fn ctx(&self) -> LifecycleContext<'_> {
        LifecycleContext::new(&self.definition, &self.host, &self.supervisor)
    }

    /// Write a fake build artifact that reports `version` when probed.
    pub fn artifact(&self, name: &str, version: &str) -> PathBuf {
        let dir = self.temp.path().join("build");
        std::fs::create_dir_all(&dir).expect("Failed to create build dir");
        let path = dir.join(name);
        std::fs::write(&path, format!("reasonkit-web {version}\n"))
            .expect("Failed to write artifact");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod artifact");
        path
    }
}
