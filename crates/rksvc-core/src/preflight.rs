//! Precondition gate run before any mutating step.
//!
//! Order: privilege, platform release, process supervisor, lightweight
//! utilities. Only the last step may change the host (by installing missing
//! packages); the service's own account and paths are never touched here.

use semver::Version;
use tracing::{info, warn};

use crate::confirm::Confirm;
use crate::error::{LifecycleError, Result};
use crate::host::{Host, LifecycleContext, PackageManager, SupervisorAvailability};

/// Oldest release tested per distribution `ID`.
const SUPPORTED_RELEASES: &[(&str, &str)] = &[
    ("ubuntu", "20.04"),
    ("debian", "11"),
    ("rhel", "8"),
    ("rocky", "8"),
    ("almalinux", "8"),
    ("fedora", "38"),
];

const PACKAGE_MANAGERS: &[PackageManager] =
    &[PackageManager::Apt, PackageManager::Dnf, PackageManager::Yum];

#[derive(Debug, Clone, Copy, Default)]
pub struct PreflightOptions {
    pub skip_dependencies: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub platform: Option<OsRelease>,
    pub installed_packages: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    /// Parse `/etc/os-release` style `KEY=value` lines.
    pub fn parse(content: &str) -> Option<Self> {
        let mut release = OsRelease::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            match key.trim() {
                "ID" => release.id = value.to_lowercase(),
                "VERSION_ID" => release.version_id = Some(value),
                "PRETTY_NAME" => release.pretty_name = Some(value),
                _ => {}
            }
        }
        if release.id.is_empty() {
            None
        } else {
            Some(release)
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.pretty_name, &self.version_id) {
            (Some(pretty), _) => pretty.clone(),
            (None, Some(version)) => format!("{} {}", self.id, version),
            (None, None) => self.id.clone(),
        }
    }

    /// Lenient `major[.minor[.patch]]` parse of `VERSION_ID`.
    pub fn version(&self) -> Option<Version> {
        lenient_version(self.version_id.as_deref()?)
    }
}

fn lenient_version(raw: &str) -> Option<Version> {
    let mut parts = raw.split('.').map(|part| part.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(|part| part.ok()).unwrap_or(0);
    let patch = parts.next().and_then(|part| part.ok()).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Compare a release against the supported table.
///
/// Returns a warning message when the release is unknown or too old.
pub fn platform_warning(release: Option<&OsRelease>) -> Option<String> {
    let Some(release) = release else {
        return Some("could not read /etc/os-release; platform is untested".to_string());
    };
    let Some((_, minimum_label)) = SUPPORTED_RELEASES
        .iter()
        .find(|(id, _)| *id == release.id)
    else {
        return Some(format!(
            "{} is not a tested distribution",
            release.display_name()
        ));
    };
    let minimum = lenient_version(minimum_label)?;
    match release.version() {
        Some(version) if version >= minimum => None,
        Some(_) => Some(format!(
            "{} is older than the minimum supported {}",
            release.display_name(),
            minimum_label
        )),
        None => Some(format!(
            "{} has no parseable VERSION_ID",
            release.display_name()
        )),
    }
}

/// Fail with [`LifecycleError::PrivilegeError`] unless running as root.
pub fn check_privilege(host: &dyn Host) -> Result<()> {
    match host.effective_uid() {
        0 => Ok(()),
        uid => Err(LifecycleError::PrivilegeError { uid }),
    }
}

pub fn run(
    ctx: &LifecycleContext<'_>,
    options: PreflightOptions,
    confirm: &dyn Confirm,
) -> Result<PreflightReport> {
    let mut report = PreflightReport::default();

    check_privilege(ctx.host)?;

    report.platform = ctx.host.os_release().as_deref().and_then(OsRelease::parse);
    if let Some(message) = platform_warning(report.platform.as_ref()) {
        warn!("{message}");
        if !confirm.confirm(&format!("{message}. Continue anyway?")) {
            return Err(LifecycleError::PlatformMismatch(message));
        }
        report.warnings.push(message);
    }

    match ctx.supervisor.availability() {
        SupervisorAvailability::Operational => {}
        SupervisorAvailability::NotBooted => {
            return Err(LifecycleError::PlatformMismatch(
                "systemd is installed but is not the running init system".to_string(),
            ));
        }
        SupervisorAvailability::Missing => {
            return Err(LifecycleError::MissingDependency(
                "systemctl not found".to_string(),
            ));
        }
    }

    let missing = missing_utilities(ctx.host);
    if missing.is_empty() {
        return Ok(report);
    }
    if options.skip_dependencies {
        let message = format!("skipping install of missing packages: {}", missing.join(", "));
        warn!("{message}");
        report.warnings.push(message);
        return Ok(report);
    }

    let manager = PACKAGE_MANAGERS
        .iter()
        .copied()
        .find(|manager| ctx.host.has_command(manager.command()))
        .ok_or_else(|| {
            LifecycleError::MissingDependency(format!(
                "{} (no supported package manager found)",
                missing.join(", ")
            ))
        })?;
    info!(packages = ?missing, manager = manager.command(), "installing missing packages");
    ctx.host
        .install_packages(manager, &missing)
        .map_err(|err| LifecycleError::MissingDependency(format!("{}: {err:#}", missing.join(", "))))?;
    report.installed_packages = missing.iter().map(|pkg| pkg.to_string()).collect();
    Ok(report)
}

fn missing_utilities(host: &dyn Host) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !host.has_command("curl") {
        missing.push("curl");
    }
    if !host.has_ca_bundle() {
        missing.push("ca-certificates");
    }
    missing
}
