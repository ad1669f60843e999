//! Install command implementation.
//!
//! Fresh install and idempotent re-install share one path: every step probes
//! before it acts, so a second run over a complete installation changes nothing.

use std::path::PathBuf;

use serde::Serialize;

use crate::binary::install_binary;
use crate::config::{ConfigOverrides, reconcile};
use crate::confirm::Confirm;
use crate::error::Result;
use crate::host::LifecycleContext;
use crate::outcome::{Outcome, StepReport};
use crate::preflight::{self, PreflightOptions};
use crate::provision::{ProvisionOptions, provision};
use crate::service::{ServiceController, ServiceStatus};
use crate::units::install_units;

/// Options for the install command
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Artifact to install; `None` keeps an already installed binary
    pub binary: Option<PathBuf>,
    /// Require the account and group to exist instead of creating them
    pub skip_account: bool,
    /// Warn about missing utilities instead of installing them
    pub skip_dependencies: bool,
}

impl InstallOptions {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_skip_account(mut self, skip: bool) -> Self {
        self.skip_account = skip;
        self
    }

    pub fn with_skip_dependencies(mut self, skip: bool) -> Self {
        self.skip_dependencies = skip;
        self
    }
}

/// Report from an install operation
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    pub installed_version: Option<String>,
    pub status: ServiceStatus,
}

impl InstallReport {
    /// Whether the install changed anything
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|step| step.outcome.changed())
    }
}

pub struct InstallCommand<'a> {
    ctx: LifecycleContext<'a>,
    confirm: &'a dyn Confirm,
}

impl<'a> InstallCommand<'a> {
    pub fn new(ctx: LifecycleContext<'a>, confirm: &'a dyn Confirm) -> Self {
        Self { ctx, confirm }
    }

    pub fn execute(&self, options: &InstallOptions) -> Result<InstallReport> {
        let ctx = &self.ctx;
        let _lock = super::begin(ctx)?;

        let preflight = preflight::run(
            ctx,
            PreflightOptions {
                skip_dependencies: options.skip_dependencies,
            },
            self.confirm,
        )?;
        let mut warnings = preflight.warnings;
        let mut steps = vec![StepReport::new(
            "dependencies",
            Outcome::from_changed(!preflight.installed_packages.is_empty()),
            preflight.installed_packages.join(", "),
        )];

        steps.extend(provision(
            ctx,
            ProvisionOptions {
                skip_account: options.skip_account,
            },
        )?);

        let binary = install_binary(ctx, options.binary.as_deref())?;
        steps.extend(binary.steps);
        warnings.extend(binary.warnings);

        steps.extend(install_units(ctx)?);
        steps.extend(reconcile(ctx, &ConfigOverrides::new())?.steps);

        let controller = ServiceController::new(*ctx);
        steps.push(controller.enable()?.1);
        let (status, started) = controller.start()?;
        steps.push(started);

        Ok(InstallReport {
            steps,
            warnings,
            installed_version: binary.installed_version,
            status,
        })
    }
}
