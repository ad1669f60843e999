//! Supervisor unit, log-rotation and tmpfiles declarations.
//!
//! Rendering is a pure function of the [`ServiceDefinition`]; identical input
//! yields byte-identical output. Writing never starts or stops the service.

use std::path::Path;

use tracing::{debug, info};

use crate::definition::{ADMIN_GROUP, ADMIN_USER, ServiceDefinition};
use crate::error::{LifecycleError, Result};
use crate::fs::write_atomic;
use crate::host::{LifecycleContext, Ownership};
use crate::outcome::{Outcome, StepReport};

const DECLARATION_MODE: u32 = 0o644;

/// Environment variable through which the daemon finds its settings.
pub const CONFIG_ENV: &str = "REASONKIT_CONFIG";

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn join_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> String {
    paths
        .into_iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_service_unit(def: &ServiceDefinition) -> String {
    let limits = &def.limits;
    let restart = &def.restart;
    let sandbox = &def.sandbox;
    format!(
        r#"[Unit]
Description={description}
After=network-online.target
Wants=network-online.target
StartLimitIntervalSec={burst_interval}
StartLimitBurst={burst_limit}

[Service]
Type=simple
User={account}
Group={group}
Environment={config_env}={config_file}
ExecStart={binary} serve
WorkingDirectory={data_dir}
Restart=on-failure
RestartSec={backoff}s

# Resource limits
MemoryMax={memory_max}
CPUQuota={cpu_quota}%
LimitNOFILE={max_open_files}
LimitNPROC={max_processes}
TasksMax={max_processes}

# Sandbox
NoNewPrivileges=yes
PrivateTmp=yes
ProtectHome=yes
ProtectSystem={protect_system}
ReadWritePaths={read_write_paths}
RestrictAddressFamilies={address_families}
RestrictNamespaces={restrict_namespaces}
ProtectKernelModules={protect_kernel_modules}
ProtectKernelTunables={protect_kernel_tunables}
ProtectControlGroups={protect_control_groups}

StandardOutput=journal
StandardError=journal
SyslogIdentifier={service_name}

[Install]
WantedBy=multi-user.target
"#,
        description = def.description,
        burst_interval = restart.burst_interval_secs,
        burst_limit = restart.burst_limit,
        account = def.account,
        group = def.group,
        config_env = CONFIG_ENV,
        config_file = def.config_file.display(),
        binary = def.binary_path.display(),
        data_dir = def.data_dir.display(),
        backoff = restart.backoff_secs,
        memory_max = limits.memory_max,
        cpu_quota = limits.cpu_quota_percent,
        max_open_files = limits.max_open_files,
        max_processes = limits.max_processes,
        protect_system = sandbox.protect_system.as_str(),
        read_write_paths = join_paths(def.read_write_paths()),
        address_families = sandbox.address_families.join(" "),
        restrict_namespaces = yes_no(sandbox.restrict_namespaces),
        protect_kernel_modules = yes_no(sandbox.protect_kernel_modules),
        protect_kernel_tunables = yes_no(sandbox.protect_kernel_tunables),
        protect_control_groups = yes_no(sandbox.protect_control_groups),
        service_name = def.service_name,
    )
}

pub fn render_logrotate(def: &ServiceDefinition) -> String {
    format!(
        "{log_dir}/*.log {{\n    daily\n    rotate 14\n    compress\n    delaycompress\n    missingok\n    notifempty\n    create 0640 {account} {group}\n    su {account} {group}\n}}\n",
        log_dir = def.log_dir.display(),
        account = def.account,
        group = def.group,
    )
}

/// Recreates the runtime directory on boot, since `/run` is a tmpfs.
pub fn render_tmpfiles(def: &ServiceDefinition) -> String {
    format!(
        "d {} 0755 {} {} -\n",
        def.runtime_dir.display(),
        def.account,
        def.group
    )
}

/// Every declaration this module owns, as `(step, path, content)`.
pub fn rendered_declarations(def: &ServiceDefinition) -> Vec<(&'static str, &Path, String)> {
    vec![
        ("unit_file", def.unit_path.as_path(), render_service_unit(def)),
        ("logrotate", def.logrotate_path.as_path(), render_logrotate(def)),
        ("tmpfiles", def.tmpfiles_path.as_path(), render_tmpfiles(def)),
    ]
}

/// Write the declarations that differ from disk, then reload the supervisor.
pub fn install_units(ctx: &LifecycleContext<'_>) -> Result<Vec<StepReport>> {
    let mut steps = Vec::new();
    for (step, path, content) in rendered_declarations(ctx.definition) {
        steps.push(write_declaration(ctx, step, path, &content)?);
    }

    let changed = steps.iter().any(|step| step.outcome.changed());
    ctx.supervisor
        .daemon_reload()
        .map_err(|source| LifecycleError::ServiceControlError {
            action: "daemon-reload",
            source,
        })?;
    steps.push(StepReport::new(
        "daemon_reload",
        Outcome::from_changed(changed),
        "supervisor definitions reloaded",
    ));
    Ok(steps)
}

fn write_declaration(
    ctx: &LifecycleContext<'_>,
    step: &'static str,
    path: &Path,
    content: &str,
) -> Result<StepReport> {
    let wrap = |source: anyhow::Error| LifecycleError::FilesystemPermissionError {
        path: path.to_path_buf(),
        source,
    };
    if std::fs::read_to_string(path).ok().as_deref() == Some(content) {
        debug!(path = %path.display(), "declaration unchanged");
        return Ok(StepReport::new(step, Outcome::NoOp, path.display().to_string()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| wrap(anyhow::Error::new(err).context(format!("Failed to create {}", parent.display()))))?;
    }
    write_atomic(path, content.as_bytes(), DECLARATION_MODE).map_err(wrap)?;
    ctx.host
        .set_owner(path, &Ownership::new(ADMIN_USER, ADMIN_GROUP))
        .map_err(wrap)?;
    info!(path = %path.display(), "wrote declaration");
    Ok(StepReport::new(step, Outcome::Changed, path.display().to_string()))
}
