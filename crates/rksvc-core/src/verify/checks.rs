//! Individual read-only probes.
//!
//! A check returns its own status. When the probe itself cannot run, the
//! error is recorded at the check's severity instead.

use std::time::Duration;

use crate::config::{ConfigStore, SettingKey, locate_engine};
use crate::definition::DirectorySpec;
use crate::error::VerificationCheckError;
use crate::fs::{is_executable_file, mode_of};
use crate::host::LifecycleContext;
use crate::units::render_service_unit;

use super::report::CheckStatus;

pub(crate) type Probe = Result<(CheckStatus, String), VerificationCheckError>;

const MIB: u64 = 1024 * 1024;
/// Below this the resident size is unremarkable.
pub const MEMORY_NORMAL_BYTES: u64 = 512 * MIB;
/// Above this the service is flagged.
pub const MEMORY_WARN_BYTES: u64 = 1536 * MIB;
pub const ERROR_LOG_WINDOW: Duration = Duration::from_secs(3600);
pub const ERROR_LOG_THRESHOLD: usize = 10;

fn pass(detail: impl Into<String>) -> Probe {
    Ok((CheckStatus::Pass, detail.into()))
}

fn fail(detail: impl Into<String>) -> Probe {
    Ok((CheckStatus::Fail, detail.into()))
}

fn warn(detail: impl Into<String>) -> Probe {
    Ok((CheckStatus::Warn, detail.into()))
}

pub(crate) fn binary(ctx: &LifecycleContext<'_>) -> Probe {
    let path = &ctx.definition.binary_path;
    if is_executable_file(path) {
        pass(path.display().to_string())
    } else if path.exists() {
        fail(format!("{} is not executable", path.display()))
    } else {
        fail(format!("{} not found", path.display()))
    }
}

pub(crate) fn binary_version(ctx: &LifecycleContext<'_>) -> Probe {
    let path = &ctx.definition.binary_path;
    if !is_executable_file(path) {
        return Err(VerificationCheckError::new("binary_version", "binary not installed"));
    }
    match ctx.host.binary_version(path) {
        Some(version) => pass(version),
        None => warn("binary did not report a version"),
    }
}

pub(crate) fn symlink(ctx: &LifecycleContext<'_>) -> Probe {
    let def = ctx.definition;
    let link = &def.symlink_path;
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = std::fs::read_link(link)
                .map_err(|err| VerificationCheckError::new("symlink", err.to_string()))?;
            if target == def.binary_path {
                pass(format!("{} -> {}", link.display(), target.display()))
            } else {
                fail(format!(
                    "{} points to {}, expected {}",
                    link.display(),
                    target.display(),
                    def.binary_path.display()
                ))
            }
        }
        Ok(_) => fail(format!("{} is not a symlink", link.display())),
        Err(_) => fail(format!("{} not found", link.display())),
    }
}

pub(crate) fn account(ctx: &LifecycleContext<'_>) -> Probe {
    let def = ctx.definition;
    match (ctx.host.user_exists(&def.account), ctx.host.group_exists(&def.group)) {
        (true, true) => pass(format!("{}:{}", def.account, def.group)),
        (false, _) => fail(format!("account '{}' does not exist", def.account)),
        (true, false) => fail(format!("group '{}' does not exist", def.group)),
    }
}

pub(crate) fn directory(ctx: &LifecycleContext<'_>, spec: &DirectorySpec) -> Probe {
    let path = &spec.path;
    if !path.is_dir() {
        return fail(format!("{} not found", path.display()));
    }
    let mut problems = Vec::new();
    if let Some(mode) = mode_of(path).filter(|mode| *mode != spec.mode) {
        problems.push(format!("mode {:o}, expected {:o}", mode, spec.mode));
    }
    let owner = ctx
        .host
        .owner(path)
        .map_err(|err| VerificationCheckError::new("directory", format!("{err:#}")))?;
    if owner.user != spec.owner || owner.group != spec.group {
        problems.push(format!(
            "owned by {}:{}, expected {}:{}",
            owner.user, owner.group, spec.owner, spec.group
        ));
    }
    if problems.is_empty() {
        pass(path.display().to_string())
    } else {
        warn(format!("{} ({})", path.display(), problems.join("; ")))
    }
}

pub(crate) fn config_file(ctx: &LifecycleContext<'_>) -> Probe {
    let def = ctx.definition;
    let path = &def.config_file;
    if !path.is_file() {
        return fail(format!("{} not found", path.display()));
    }
    match mode_of(path) {
        Some(0o640) => {}
        Some(mode) => return fail(format!("{} has mode {:o}, expected 640", path.display(), mode)),
        None => return Err(VerificationCheckError::new("config_file", "mode unreadable")),
    }
    let owner = ctx
        .host
        .owner(path)
        .map_err(|err| VerificationCheckError::new("config_file", format!("{err:#}")))?;
    if owner.group != def.group {
        return fail(format!(
            "{} has group {}, expected {}",
            path.display(),
            owner.group,
            def.group
        ));
    }
    match ConfigStore::for_definition(def).load() {
        Err(err) => fail(format!("{err:#}")),
        Ok(Some(document)) if !document.rejected_keys().is_empty() => {
            let names: Vec<&str> = document
                .rejected_keys()
                .into_iter()
                .map(SettingKey::name)
                .collect();
            warn(format!(
                "{} has invalid values for {}; defaults apply",
                path.display(),
                names.join(", ")
            ))
        }
        Ok(_) => pass(format!("{} (640)", path.display())),
    }
}

pub(crate) fn unit_file(ctx: &LifecycleContext<'_>) -> Probe {
    let def = ctx.definition;
    let Ok(content) = std::fs::read_to_string(&def.unit_path) else {
        return fail(format!("{} not found", def.unit_path.display()));
    };
    if content == render_service_unit(def) {
        pass(def.unit_path.display().to_string())
    } else {
        warn(format!(
            "{} differs from the generated unit; run `rksvc upgrade` to regenerate",
            def.unit_path.display()
        ))
    }
}

pub(crate) fn service_enabled(ctx: &LifecycleContext<'_>) -> Probe {
    let unit = ctx.definition.unit_name();
    if ctx.supervisor.is_enabled(&unit) {
        pass("enabled")
    } else {
        fail(format!("{unit} is not enabled"))
    }
}

pub(crate) fn service_active(ctx: &LifecycleContext<'_>) -> Probe {
    let unit = ctx.definition.unit_name();
    if !ctx.supervisor.is_active(&unit) {
        return fail(format!("{unit} is not active"));
    }
    let pid = ctx
        .supervisor
        .main_pid(&unit)
        .map(|pid| format!("pid {pid}"))
        .unwrap_or_else(|| "pid unknown".to_string());
    let Some(bytes) = ctx.supervisor.memory_bytes(&unit) else {
        return pass(format!("active ({pid})"));
    };
    let memory = format!("{} MiB", bytes / MIB);
    if bytes > MEMORY_WARN_BYTES {
        warn(format!("active ({pid}, memory {memory} above {} MiB)", MEMORY_WARN_BYTES / MIB))
    } else if bytes >= MEMORY_NORMAL_BYTES {
        pass(format!("active ({pid}, memory {memory}, elevated)"))
    } else {
        pass(format!("active ({pid}, memory {memory})"))
    }
}

pub(crate) fn engine_dependency(ctx: &LifecycleContext<'_>) -> Probe {
    let document = ConfigStore::for_definition(ctx.definition).load().ok().flatten();
    let configured = document.as_ref().and_then(|doc| doc.chrome_path());
    let Some(engine) = locate_engine(ctx.host, configured) else {
        return warn(match configured {
            Some(path) => format!("configured engine {path} is not executable"),
            None => "no browser engine found on the search path".to_string(),
        });
    };
    match ctx.host.binary_version(&engine) {
        Some(version) => pass(format!("{} ({version})", engine.display())),
        None => warn(format!("{} did not report a version", engine.display())),
    }
}

pub(crate) fn listening_sockets(ctx: &LifecycleContext<'_>) -> Probe {
    let unit = ctx.definition.unit_name();
    let Some(pid) = ctx.supervisor.main_pid(&unit) else {
        return pass("no running process");
    };
    let sockets = ctx
        .host
        .listening_sockets(pid)
        .map_err(|err| VerificationCheckError::new("listening_sockets", format!("{err:#}")))?;
    if sockets.is_empty() {
        pass("no listening sockets")
    } else {
        warn(format!("unexpected listening sockets: {}", sockets.join(", ")))
    }
}

pub(crate) fn error_log_volume(ctx: &LifecycleContext<'_>) -> Probe {
    let unit = ctx.definition.unit_name();
    let lines = ctx
        .host
        .error_log_lines(&unit, ERROR_LOG_WINDOW)
        .map_err(|err| VerificationCheckError::new("error_log_volume", format!("{err:#}")))?;
    let detail = format!("{lines} error lines in the last hour");
    if lines >= ERROR_LOG_THRESHOLD {
        warn(detail)
    } else {
        pass(detail)
    }
}
