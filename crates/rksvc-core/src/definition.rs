//! Static description of the deployment.
//!
//! A [`ServiceDefinition`] is built once from the constants below and handed to
//! every step by reference. Variants (custom prefix, test roots) are produced as
//! new values; nothing mutates a definition in place.

use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "reasonkit-web";
pub const ACCOUNT_NAME: &str = "reasonkit";
pub const GROUP_NAME: &str = "reasonkit";
pub const ADMIN_USER: &str = "root";
pub const ADMIN_GROUP: &str = "root";
pub const DEFAULT_PREFIX: &str = "/opt/reasonkit";

/// Resource ceilings rendered into the unit definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// `MemoryMax=` value, systemd size syntax.
    pub memory_max: String,
    /// `CPUQuota=` percentage.
    pub cpu_quota_percent: u32,
    pub max_open_files: u64,
    pub max_processes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub backoff_secs: u64,
    pub burst_limit: u32,
    pub burst_interval_secs: u64,
}

/// Filesystem protection level (`ProtectSystem=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectSystem {
    Full,
    Strict,
}

impl ProtectSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtectSystem::Full => "full",
            ProtectSystem::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub protect_system: ProtectSystem,
    pub address_families: Vec<String>,
    pub restrict_namespaces: bool,
    pub protect_kernel_modules: bool,
    pub protect_kernel_tunables: bool,
    pub protect_control_groups: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub service_name: String,
    pub description: String,
    pub account: String,
    pub group: String,
    pub prefix: PathBuf,
    pub binary_dir: PathBuf,
    pub binary_path: PathBuf,
    pub symlink_path: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub example_config_file: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub unit_path: PathBuf,
    pub logrotate_path: PathBuf,
    pub tmpfiles_path: PathBuf,
    pub lock_path: PathBuf,
    pub limits: ResourceLimits,
    pub restart: RestartPolicy,
    pub sandbox: SandboxPolicy,
}

impl ServiceDefinition {
    /// The production layout.
    pub fn reasonkit() -> Self {
        let prefix = PathBuf::from(DEFAULT_PREFIX);
        let binary_dir = prefix.join("bin");
        let config_dir = PathBuf::from("/etc/reasonkit");
        Self {
            service_name: SERVICE_NAME.to_string(),
            description: "ReasonKit web automation daemon".to_string(),
            account: ACCOUNT_NAME.to_string(),
            group: GROUP_NAME.to_string(),
            binary_path: binary_dir.join(SERVICE_NAME),
            binary_dir,
            prefix,
            symlink_path: PathBuf::from("/usr/local/bin").join(SERVICE_NAME),
            config_file: config_dir.join("config.toml"),
            example_config_file: config_dir.join("config.example.toml"),
            config_dir,
            data_dir: PathBuf::from("/var/lib/reasonkit"),
            log_dir: PathBuf::from("/var/log/reasonkit"),
            runtime_dir: PathBuf::from("/run/reasonkit"),
            unit_path: PathBuf::from("/etc/systemd/system").join(format!("{SERVICE_NAME}.service")),
            logrotate_path: PathBuf::from("/etc/logrotate.d").join(SERVICE_NAME),
            tmpfiles_path: PathBuf::from("/etc/tmpfiles.d").join(format!("{SERVICE_NAME}.conf")),
            lock_path: PathBuf::from("/run/lock").join(format!("{SERVICE_NAME}.lock")),
            limits: ResourceLimits {
                memory_max: "2G".to_string(),
                cpu_quota_percent: 200,
                max_open_files: 65536,
                max_processes: 512,
            },
            restart: RestartPolicy {
                backoff_secs: 5,
                burst_limit: 5,
                burst_interval_secs: 300,
            },
            sandbox: SandboxPolicy {
                protect_system: ProtectSystem::Strict,
                address_families: vec![
                    "AF_UNIX".to_string(),
                    "AF_INET".to_string(),
                    "AF_INET6".to_string(),
                ],
                restrict_namespaces: true,
                protect_kernel_modules: true,
                protect_kernel_tunables: true,
                protect_control_groups: true,
            },
        }
    }

    /// Same layout with the binary placed under `prefix/bin`.
    pub fn with_prefix(&self, prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        let binary_dir = prefix.join("bin");
        Self {
            binary_path: binary_dir.join(&self.service_name),
            binary_dir,
            prefix,
            ..self.clone()
        }
    }

    /// Follow the stable symlink back to the prefix a previous install used.
    ///
    /// Returns an unchanged copy when the symlink is absent or does not point
    /// at a `<prefix>/bin/<service>` binary.
    pub fn with_installed_prefix(&self) -> Self {
        let installed_prefix = std::fs::read_link(&self.symlink_path)
            .ok()
            .filter(|target| target.file_name() == self.binary_path.file_name())
            .and_then(|target| {
                let bin = target.parent()?;
                if bin.file_name()? != "bin" {
                    return None;
                }
                bin.parent().map(Path::to_path_buf)
            });
        match installed_prefix {
            Some(prefix) if prefix != self.prefix => self.with_prefix(prefix),
            _ => self.clone(),
        }
    }

    /// Re-base every path under `root`.
    ///
    /// Used to stage a layout inside a scratch directory.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let rebase = |path: &Path| root.join(path.strip_prefix("/").unwrap_or(path));
        Self {
            prefix: rebase(&self.prefix),
            binary_dir: rebase(&self.binary_dir),
            binary_path: rebase(&self.binary_path),
            symlink_path: rebase(&self.symlink_path),
            config_dir: rebase(&self.config_dir),
            config_file: rebase(&self.config_file),
            example_config_file: rebase(&self.example_config_file),
            data_dir: rebase(&self.data_dir),
            log_dir: rebase(&self.log_dir),
            runtime_dir: rebase(&self.runtime_dir),
            unit_path: rebase(&self.unit_path),
            logrotate_path: rebase(&self.logrotate_path),
            tmpfiles_path: rebase(&self.tmpfiles_path),
            lock_path: rebase(&self.lock_path),
            ..self.clone()
        }
    }

    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    /// Directory matrix enforced by the provisioner, in creation order.
    pub fn directory_specs(&self) -> Vec<DirectorySpec> {
        vec![
            DirectorySpec {
                role: DirectoryRole::Binary,
                path: self.binary_dir.clone(),
                owner: ADMIN_USER.to_string(),
                group: ADMIN_GROUP.to_string(),
                mode: 0o755,
            },
            DirectorySpec {
                role: DirectoryRole::Config,
                path: self.config_dir.clone(),
                owner: ADMIN_USER.to_string(),
                group: self.group.clone(),
                mode: 0o750,
            },
            DirectorySpec {
                role: DirectoryRole::Data,
                path: self.data_dir.clone(),
                owner: self.account.clone(),
                group: self.group.clone(),
                mode: 0o750,
            },
            DirectorySpec {
                role: DirectoryRole::Log,
                path: self.log_dir.clone(),
                owner: self.account.clone(),
                group: self.group.clone(),
                mode: 0o750,
            },
            DirectorySpec {
                role: DirectoryRole::Runtime,
                path: self.runtime_dir.clone(),
                owner: self.account.clone(),
                group: self.group.clone(),
                mode: 0o755,
            },
        ]
    }

    /// Paths the sandboxed process may write to.
    pub fn read_write_paths(&self) -> [&Path; 3] {
        [&self.data_dir, &self.log_dir, &self.runtime_dir]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRole {
    Binary,
    Config,
    Data,
    Log,
    Runtime,
}

impl DirectoryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DirectoryRole::Binary => "binary",
            DirectoryRole::Config => "config",
            DirectoryRole::Data => "data",
            DirectoryRole::Log => "log",
            DirectoryRole::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySpec {
    pub role: DirectoryRole,
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}
