//! Service account, group and directory hierarchy.
//!
//! Every action is preceded by a probe, so running this any number of times
//! converges on the matrix from [`ServiceDefinition::directory_specs`].
//!
//! [`ServiceDefinition::directory_specs`]: crate::definition::ServiceDefinition::directory_specs

use anyhow::Context;
use tracing::{debug, info};

use crate::definition::DirectorySpec;
use crate::error::{LifecycleError, Result};
use crate::fs::{mode_of, set_mode};
use crate::host::{LifecycleContext, Ownership};
use crate::outcome::{Outcome, StepReport};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// Expect the account and group to exist already; never create them.
    pub skip_account: bool,
}

pub fn provision(ctx: &LifecycleContext<'_>, options: ProvisionOptions) -> Result<Vec<StepReport>> {
    let mut steps = Vec::new();
    steps.push(ensure_group(ctx, options)?);
    steps.push(ensure_account(ctx, options)?);
    for spec in ctx.definition.directory_specs() {
        steps.push(ensure_directory(ctx, &spec)?);
    }
    Ok(steps)
}

fn ensure_group(ctx: &LifecycleContext<'_>, options: ProvisionOptions) -> Result<StepReport> {
    let group = &ctx.definition.group;
    if ctx.host.group_exists(group) {
        debug!(group = %group, "group already present");
        return Ok(StepReport::new("group", Outcome::NoOp, group.as_str()));
    }
    if options.skip_account {
        return Err(LifecycleError::AccountProvisioningError {
            name: group.clone(),
            source: anyhow::anyhow!("group does not exist and account creation was skipped"),
        });
    }
    info!(group = %group, "creating system group");
    ctx.host
        .create_group(group)
        .map_err(|source| LifecycleError::AccountProvisioningError {
            name: group.clone(),
            source,
        })?;
    Ok(StepReport::new("group", Outcome::Changed, group.as_str()))
}

fn ensure_account(ctx: &LifecycleContext<'_>, options: ProvisionOptions) -> Result<StepReport> {
    let def = ctx.definition;
    if ctx.host.user_exists(&def.account) {
        debug!(account = %def.account, "account already present");
        return Ok(StepReport::new("account", Outcome::NoOp, def.account.as_str()));
    }
    if options.skip_account {
        return Err(LifecycleError::AccountProvisioningError {
            name: def.account.clone(),
            source: anyhow::anyhow!("account does not exist and account creation was skipped"),
        });
    }
    info!(account = %def.account, group = %def.group, "creating system account");
    ctx.host
        .create_user(&def.account, &def.group)
        .map_err(|source| LifecycleError::AccountProvisioningError {
            name: def.account.clone(),
            source,
        })?;
    Ok(StepReport::new("account", Outcome::Changed, def.account.as_str()))
}

fn ensure_directory(ctx: &LifecycleContext<'_>, spec: &DirectorySpec) -> Result<StepReport> {
    let path = &spec.path;
    let wrap = |source: anyhow::Error| LifecycleError::FilesystemPermissionError {
        path: path.clone(),
        source,
    };
    let mut changes = Vec::new();

    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))
            .map_err(wrap)?;
        changes.push("created");
    }
    if mode_of(path) != Some(spec.mode) {
        set_mode(path, spec.mode).map_err(wrap)?;
        changes.push("mode");
    }
    let wanted = Ownership::new(&spec.owner, &spec.group);
    let current = ctx.host.owner(path).ok();
    if current.as_ref() != Some(&wanted) {
        ctx.host.set_owner(path, &wanted).map_err(wrap)?;
        changes.push("owner");
    }

    let step = format!("{}_dir", spec.role.as_str());
    if changes.is_empty() {
        debug!(path = %path.display(), "directory already conforms");
        return Ok(StepReport::new(step, Outcome::NoOp, path.display().to_string()));
    }
    info!(
        path = %path.display(),
        mode = %format!("{:o}", spec.mode),
        owner = %spec.owner,
        group = %spec.group,
        "prepared directory"
    );
    Ok(StepReport::new(
        step,
        Outcome::Changed,
        format!("{} ({})", path.display(), changes.join(", ")),
    ))
}
