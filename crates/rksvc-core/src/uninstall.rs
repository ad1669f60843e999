//! Reverse provisioning.
//!
//! Service registration, the binary and its symlink always go. Configuration,
//! data and logs go only with `purge`; the account only with `remove_account`.
//! Anything already absent is skipped silently.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, Result};
use crate::fs::{remove_dir_if_empty, remove_path_if_exists};
use crate::host::{LifecycleContext, SupervisorAvailability};
use crate::outcome::{Outcome, StepReport};
use crate::service::ServiceController;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallOptions {
    pub purge: bool,
    pub remove_account: bool,
}

impl UninstallOptions {
    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn with_remove_account(mut self, remove_account: bool) -> Self {
        self.remove_account = remove_account;
        self
    }

    /// Whether the run destroys operator state and needs confirmation.
    pub fn is_destructive(&self) -> bool {
        self.purge || self.remove_account
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    /// Paths deliberately left in place for a future reinstall.
    pub preserved_paths: Vec<PathBuf>,
    pub preserved_account: Option<String>,
}

impl UninstallReport {
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|step| step.outcome.changed())
    }
}

pub fn uninstall(ctx: &LifecycleContext<'_>, options: UninstallOptions) -> Result<UninstallReport> {
    let def = ctx.definition;
    let mut report = UninstallReport::default();

    if ctx.supervisor.availability() == SupervisorAvailability::Operational {
        let controller = ServiceController::new(*ctx);
        report.steps.push(controller.stop()?.1);
        report.steps.push(controller.disable()?.1);
    } else {
        let message = "process supervisor unavailable; skipping stop and disable".to_string();
        warn!("{message}");
        report.warnings.push(message);
    }

    for (step, path) in [
        ("unit_file", &def.unit_path),
        ("logrotate", &def.logrotate_path),
        ("tmpfiles", &def.tmpfiles_path),
    ] {
        report.steps.push(remove(step, path)?);
    }
    if ctx.supervisor.availability() == SupervisorAvailability::Operational {
        ctx.supervisor
            .daemon_reload()
            .map_err(|source| LifecycleError::ServiceControlError {
                action: "daemon-reload",
                source,
            })?;
    }

    report.steps.push(remove_symlink(ctx, &mut report.warnings)?);
    report.steps.push(remove("binary", &def.binary_path)?);
    for dir in [&def.binary_dir, &def.prefix] {
        if remove_dir_if_empty(dir) {
            debug!(path = %dir.display(), "removed empty directory");
        }
    }
    report.steps.push(remove("runtime_dir", &def.runtime_dir)?);

    let retained = [
        ("config_dir", &def.config_dir),
        ("data_dir", &def.data_dir),
        ("log_dir", &def.log_dir),
    ];
    if options.purge {
        for (step, path) in retained {
            report.steps.push(remove(step, path)?);
        }
    } else {
        report.preserved_paths = retained
            .iter()
            .filter(|(_, path)| path.exists())
            .map(|(_, path)| path.to_path_buf())
            .collect();
    }

    if options.remove_account {
        report.steps.extend(remove_account(ctx)?);
    } else if ctx.host.user_exists(&def.account) {
        report.preserved_account = Some(def.account.clone());
    }

    Ok(report)
}

fn remove(step: &'static str, path: &Path) -> Result<StepReport> {
    let removed = remove_path_if_exists(path).map_err(|source| {
        LifecycleError::FilesystemPermissionError {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if removed {
        info!(path = %path.display(), "removed");
    }
    Ok(StepReport::new(
        step,
        Outcome::from_changed(removed),
        path.display().to_string(),
    ))
}

/// Only a symlink that points at our binary is ours to remove.
fn remove_symlink(ctx: &LifecycleContext<'_>, warnings: &mut Vec<String>) -> Result<StepReport> {
    let def = ctx.definition;
    let link = &def.symlink_path;
    let detail = link.display().to_string();
    let Ok(meta) = std::fs::symlink_metadata(link) else {
        return Ok(StepReport::new("symlink", Outcome::NoOp, detail));
    };
    let ours = meta.file_type().is_symlink()
        && std::fs::read_link(link).is_ok_and(|target| target == def.binary_path);
    if ours {
        return remove("symlink", link);
    }
    let message = format!(
        "{} is not a symlink to {}; left in place",
        link.display(),
        def.binary_path.display()
    );
    warn!("{message}");
    warnings.push(message);
    Ok(StepReport::new("symlink", Outcome::NoOp, detail))
}

fn remove_account(ctx: &LifecycleContext<'_>) -> Result<Vec<StepReport>> {
    let def = ctx.definition;
    let account_error = |name: &str, source: anyhow::Error| LifecycleError::AccountProvisioningError {
        name: name.to_string(),
        source,
    };
    let mut steps = Vec::new();

    if ctx.host.user_exists(&def.account) {
        info!(account = %def.account, "terminating account processes");
        ctx.host
            .kill_user_processes(&def.account)
            .map_err(|source| account_error(&def.account, source))?;
        ctx.host
            .delete_user(&def.account)
            .map_err(|source| account_error(&def.account, source))?;
        info!(account = %def.account, "deleted account");
        steps.push(StepReport::new("account", Outcome::Changed, def.account.as_str()));
    } else {
        steps.push(StepReport::new("account", Outcome::NoOp, def.account.as_str()));
    }

    if ctx.host.group_exists(&def.group) {
        ctx.host
            .delete_group(&def.group)
            .map_err(|source| account_error(&def.group, source))?;
        info!(group = %def.group, "deleted group");
        steps.push(StepReport::new("group", Outcome::Changed, def.group.as_str()));
    } else {
        steps.push(StepReport::new("group", Outcome::NoOp, def.group.as_str()));
    }
    Ok(steps)
}
