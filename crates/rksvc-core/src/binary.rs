//! Executable artifact installation and the stable invocation symlink.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use semver::Version;
use tracing::{debug, info, warn};

use crate::definition::{ADMIN_GROUP, ADMIN_USER};
use crate::error::{LifecycleError, Result};
use crate::fs::{copy_atomic, file_digest, is_executable_file, mode_of, set_mode};
use crate::host::{LifecycleContext, Ownership};
use crate::outcome::{Outcome, StepReport};

const BINARY_MODE: u32 = 0o755;

#[derive(Debug, Clone, Default)]
pub struct BinaryInstallReport {
    pub steps: Vec<StepReport>,
    pub previous_version: Option<String>,
    pub installed_version: Option<String>,
    pub warnings: Vec<String>,
    /// The service was stopped for the swap and started again.
    pub restarted: bool,
}

/// Look for a freshly built artifact relative to `dir`.
pub fn discover_candidate(dir: &Path, binary_name: &str) -> Option<PathBuf> {
    [
        dir.join(binary_name),
        dir.join("target").join("release").join(binary_name),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Pull a semantic version out of `--version` output such as `reasonkit-web 0.4.1`.
pub fn parse_reported_version(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .map(|token| token.trim_start_matches('v'))
        .find_map(|token| Version::parse(token).ok())
}

/// Install `candidate` into the binary directory and point the symlink at it.
///
/// Without a candidate an existing installed binary is kept as-is.
pub fn install_binary(
    ctx: &LifecycleContext<'_>,
    candidate: Option<&Path>,
) -> Result<BinaryInstallReport> {
    let def = ctx.definition;
    let mut report = BinaryInstallReport::default();
    let installed = is_executable_file(&def.binary_path);
    if installed {
        report.previous_version = ctx.host.binary_version(&def.binary_path);
    }

    match candidate {
        Some(candidate) => replace_binary(ctx, candidate, installed, &mut report)?,
        None if installed => {
            debug!(path = %def.binary_path.display(), "no artifact given; keeping installed binary");
            report.installed_version = report.previous_version.clone();
            report.steps.push(StepReport::new(
                "binary",
                Outcome::NoOp,
                def.binary_path.display().to_string(),
            ));
        }
        None => {
            return Err(LifecycleError::BinaryInvalid {
                path: def.binary_path.clone(),
                reason: "no artifact given and none installed".to_string(),
            });
        }
    }

    report.steps.push(ensure_symlink(ctx, &mut report.warnings)?);
    Ok(report)
}

fn validate_candidate(candidate: &Path, warnings: &mut Vec<String>) -> Result<()> {
    let invalid = |reason: &str| LifecycleError::BinaryInvalid {
        path: candidate.to_path_buf(),
        reason: reason.to_string(),
    };
    let meta = std::fs::metadata(candidate).map_err(|_| invalid("does not exist"))?;
    if !meta.is_file() {
        return Err(invalid("not a regular file"));
    }
    if !is_executable_file(candidate) {
        let mode = mode_of(candidate).unwrap_or(0o644) | 0o755;
        set_mode(candidate, mode).map_err(|_| invalid("not executable and could not be made so"))?;
        let message = format!("{} was not executable; mode set to {:o}", candidate.display(), mode);
        warn!("{message}");
        warnings.push(message);
    }
    Ok(())
}

fn replace_binary(
    ctx: &LifecycleContext<'_>,
    candidate: &Path,
    installed: bool,
    report: &mut BinaryInstallReport,
) -> Result<()> {
    let def = ctx.definition;
    validate_candidate(candidate, &mut report.warnings)?;

    let candidate_version = ctx.host.binary_version(candidate);
    if candidate_version.is_none() {
        let message = format!("{} did not report a version", candidate.display());
        warn!("{message}");
        report.warnings.push(message);
    }
    if let Some(message) = downgrade_warning(report.previous_version.as_deref(), candidate_version.as_deref()) {
        warn!("{message}");
        report.warnings.push(message);
    }

    let fs_error = |source: anyhow::Error| LifecycleError::FilesystemPermissionError {
        path: def.binary_path.clone(),
        source,
    };
    if installed && file_digest(candidate).map_err(fs_error)? == file_digest(&def.binary_path).map_err(fs_error)? {
        debug!(path = %def.binary_path.display(), "installed binary already matches artifact");
        if mode_of(&def.binary_path) != Some(BINARY_MODE) {
            set_mode(&def.binary_path, BINARY_MODE).map_err(fs_error)?;
        }
        report.installed_version = candidate_version;
        report.steps.push(StepReport::new(
            "binary",
            Outcome::NoOp,
            def.binary_path.display().to_string(),
        ));
        return Ok(());
    }

    let unit = def.unit_name();
    let was_active = ctx.supervisor.is_active(&unit);
    if was_active {
        info!(unit = %unit, "stopping service for binary replacement");
        ctx.supervisor
            .stop(&unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "stop", source })?;
    }

    let swapped = copy_atomic(candidate, &def.binary_path, BINARY_MODE).and_then(|()| {
        ctx.host
            .set_owner(&def.binary_path, &Ownership::new(ADMIN_USER, ADMIN_GROUP))
    });
    if let Err(source) = swapped {
        if was_active {
            // The previous binary is still in place; bring it back up.
            match ctx.supervisor.start(&unit) {
                Ok(()) => info!(unit = %unit, "restarted service after failed replacement"),
                Err(err) => warn!(unit = %unit, "failed to restart service: {err:#}"),
            }
        }
        return Err(fs_error(source));
    }
    info!(
        from = %candidate.display(),
        to = %def.binary_path.display(),
        version = candidate_version.as_deref().unwrap_or("unknown"),
        "installed binary"
    );

    if was_active {
        info!(unit = %unit, "starting service after binary replacement");
        ctx.supervisor
            .start(&unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "start", source })?;
        report.restarted = true;
    }

    let detail = match (&report.previous_version, &candidate_version) {
        (Some(old), Some(new)) => format!("{old} -> {new}"),
        (None, Some(new)) => new.clone(),
        _ => def.binary_path.display().to_string(),
    };
    report.installed_version = candidate_version;
    report.steps.push(StepReport::new("binary", Outcome::Changed, detail));
    Ok(())
}

fn downgrade_warning(previous: Option<&str>, candidate: Option<&str>) -> Option<String> {
    let previous = parse_reported_version(previous?)?;
    let candidate = parse_reported_version(candidate?)?;
    (candidate < previous).then(|| format!("downgrading from {previous} to {candidate}"))
}

fn ensure_symlink(ctx: &LifecycleContext<'_>, warnings: &mut Vec<String>) -> Result<StepReport> {
    let def = ctx.definition;
    let link = &def.symlink_path;
    let target = &def.binary_path;
    let fs_error = |source: anyhow::Error| LifecycleError::FilesystemPermissionError {
        path: link.clone(),
        source,
    };

    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let current = std::fs::read_link(link)
                .with_context(|| format!("Failed to read symlink: {}", link.display()))
                .map_err(fs_error)?;
            if current == *target {
                return Ok(StepReport::new("symlink", Outcome::NoOp, link.display().to_string()));
            }
            let message = format!(
                "{} pointed to {}; repointing to {}",
                link.display(),
                current.display(),
                target.display()
            );
            warn!("{message}");
            warnings.push(message);
        }
        Ok(_) => {
            let message = format!(
                "{} exists and is not a symlink; left untouched",
                link.display()
            );
            warn!("{message}");
            warnings.push(message);
            return Ok(StepReport::new("symlink", Outcome::NoOp, link.display().to_string()));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(fs_error(
                anyhow::Error::new(err).context(format!("Failed to inspect {}", link.display())),
            ));
        }
    }

    replace_symlink(link, target).map_err(fs_error)?;
    info!(link = %link.display(), target = %target.display(), "linked binary");
    Ok(StepReport::new(
        "symlink",
        Outcome::Changed,
        format!("{} -> {}", link.display(), target.display()),
    ))
}

/// Create or atomically repoint `link` to `target`.
fn replace_symlink(link: &Path, target: &Path) -> anyhow::Result<()> {
    let parent = link
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Symlink has no parent: {}", link.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    let tmp_link = parent.join(format!(".{}.link.tmp", std::process::id()));
    let _ = std::fs::remove_file(&tmp_link);
    std::os::unix::fs::symlink(target, &tmp_link)
        .with_context(|| format!("Failed to create symlink: {}", tmp_link.display()))?;
    std::fs::rename(&tmp_link, link)
        .with_context(|| format!("Failed to move symlink into place: {}", link.display()))?;
    Ok(())
}
