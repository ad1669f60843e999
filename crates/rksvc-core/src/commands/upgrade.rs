//! In-place upgrade of an existing installation.

use std::path::PathBuf;

use serde::Serialize;

use crate::binary::install_binary;
use crate::config::refresh_example;
use crate::confirm::Confirm;
use crate::error::{LifecycleError, Result};
use crate::host::LifecycleContext;
use crate::outcome::StepReport;
use crate::preflight::{self, PreflightOptions};
use crate::provision::{ProvisionOptions, provision};
use crate::service::{ServiceController, ServiceStatus};
use crate::state::InstallationState;
use crate::units::install_units;

#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub binary: PathBuf,
}

impl UpgradeOptions {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    pub previous_version: Option<String>,
    pub installed_version: Option<String>,
    pub status: ServiceStatus,
}

pub struct UpgradeCommand<'a> {
    ctx: LifecycleContext<'a>,
    confirm: &'a dyn Confirm,
}

impl<'a> UpgradeCommand<'a> {
    pub fn new(ctx: LifecycleContext<'a>, confirm: &'a dyn Confirm) -> Self {
        Self { ctx, confirm }
    }

    /// Units are regenerated before the binary swap so the restarted
    /// service picks up both.
    pub fn execute(&self, options: &UpgradeOptions) -> Result<UpgradeReport> {
        let ctx = &self.ctx;
        let _lock = super::begin(ctx)?;

        let preflight = preflight::run(
            ctx,
            PreflightOptions {
                skip_dependencies: true,
            },
            self.confirm,
        )?;
        if !InstallationState::probe(ctx).is_installed() {
            return Err(LifecycleError::UpgradeWithoutInstall(
                ctx.definition.service_name.clone(),
            ));
        }

        let mut warnings = preflight.warnings;
        let mut steps = provision(ctx, ProvisionOptions { skip_account: true })?;
        steps.extend(install_units(ctx)?);

        let binary = install_binary(ctx, Some(&options.binary))?;
        steps.extend(binary.steps);
        warnings.extend(binary.warnings);

        steps.push(refresh_example(ctx)?);

        Ok(UpgradeReport {
            steps,
            warnings,
            previous_version: binary.previous_version,
            installed_version: binary.installed_version,
            status: ServiceController::new(*ctx).status(),
        })
    }
}
