//! Read-only verification of an installation.
//!
//! Every check runs, in a fixed order, regardless of earlier results.

mod checks;
pub mod report;

use tracing::debug;

use crate::definition::DirectoryRole;
use crate::host::LifecycleContext;

pub use checks::{
    ERROR_LOG_THRESHOLD, ERROR_LOG_WINDOW, MEMORY_NORMAL_BYTES, MEMORY_WARN_BYTES,
};
pub use report::{CheckResult, CheckStatus, VerificationReport, VerificationSummary};

/// Check names in execution order.
pub const CHECK_ORDER: [&str; 15] = [
    "binary",
    "binary_version",
    "symlink",
    "account",
    "config_dir",
    "data_dir",
    "log_dir",
    "runtime_dir",
    "config_file",
    "unit_file",
    "service_enabled",
    "service_active",
    "engine_dependency",
    "listening_sockets",
    "error_log_volume",
];

/// Status recorded when a check's probe itself errors.
fn severity(name: &str) -> CheckStatus {
    match name {
        "binary_version" | "engine_dependency" | "listening_sockets" | "error_log_volume" => {
            CheckStatus::Warn
        }
        _ => CheckStatus::Fail,
    }
}

fn run_check(ctx: &LifecycleContext<'_>, name: &str) -> checks::Probe {
    let directory = |role: DirectoryRole| {
        let spec = ctx
            .definition
            .directory_specs()
            .into_iter()
            .find(|spec| spec.role == role);
        match spec {
            Some(spec) => checks::directory(ctx, &spec),
            None => Err(crate::error::VerificationCheckError::new(
                "directory",
                format!("no {} directory declared", role.as_str()),
            )),
        }
    };
    match name {
        "binary" => checks::binary(ctx),
        "binary_version" => checks::binary_version(ctx),
        "symlink" => checks::symlink(ctx),
        "account" => checks::account(ctx),
        "config_dir" => directory(DirectoryRole::Config),
        "data_dir" => directory(DirectoryRole::Data),
        "log_dir" => directory(DirectoryRole::Log),
        "runtime_dir" => directory(DirectoryRole::Runtime),
        "config_file" => checks::config_file(ctx),
        "unit_file" => checks::unit_file(ctx),
        "service_enabled" => checks::service_enabled(ctx),
        "service_active" => checks::service_active(ctx),
        "engine_dependency" => checks::engine_dependency(ctx),
        "listening_sockets" => checks::listening_sockets(ctx),
        "error_log_volume" => checks::error_log_volume(ctx),
        other => Err(crate::error::VerificationCheckError::new(
            "unknown",
            format!("no check named {other}"),
        )),
    }
}

pub fn verify(ctx: &LifecycleContext<'_>) -> VerificationReport {
    let results = CHECK_ORDER
        .iter()
        .map(|name| {
            let (status, detail) = match run_check(ctx, name) {
                Ok(result) => result,
                Err(err) => (severity(name), err.to_string()),
            };
            debug!(check = *name, status = status.label(), "{detail}");
            CheckResult::new(*name, status, detail)
        })
        .collect();
    VerificationReport::new(ctx.host.hostname(), results)
}
