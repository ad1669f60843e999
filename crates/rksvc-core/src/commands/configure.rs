//! Configure command implementation.
//!
//! Interactive and non-interactive front-ends both hand over a finished set of
//! overrides; from here on there is a single write path.

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::config::{ConfigDocument, ConfigOverrides, ConfigStore, reconcile};
use crate::error::{LifecycleError, Result};
use crate::host::LifecycleContext;
use crate::outcome::StepReport;
use crate::service::{ServiceController, ServiceStatus};

#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    pub overrides: ConfigOverrides,
    /// Enable the unit for boot
    pub enable: bool,
    /// Restart if running, start otherwise
    pub start: bool,
}

impl ConfigureOptions {
    pub fn new(overrides: ConfigOverrides) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureReport {
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    pub backup: Option<PathBuf>,
    pub status: ServiceStatus,
}

pub struct ConfigureCommand<'a> {
    ctx: LifecycleContext<'a>,
}

impl<'a> ConfigureCommand<'a> {
    pub fn new(ctx: LifecycleContext<'a>) -> Self {
        Self { ctx }
    }

    /// The document currently on disk, for showing current values in prompts.
    pub fn current_document(&self) -> Result<Option<ConfigDocument>> {
        let store = ConfigStore::for_definition(self.ctx.definition);
        store
            .load()
            .map_err(|source| LifecycleError::ConfigWriteError {
                path: store.config_path().to_path_buf(),
                source,
            })
    }

    pub fn execute(&self, options: &ConfigureOptions) -> Result<ConfigureReport> {
        let ctx = &self.ctx;
        let _lock = super::begin(ctx)?;

        let reconciled = reconcile(ctx, &options.overrides)?;
        let config_changed = reconciled.document_written();
        let mut steps = reconciled.steps;
        let mut warnings = Vec::new();

        let controller = ServiceController::new(*ctx);
        if options.enable {
            steps.push(controller.enable()?.1);
        }
        if options.start {
            steps.push(controller.restart_if_active()?.1);
        } else if config_changed && controller.status().active {
            let message = format!(
                "{} is running with the previous settings; restart it to apply",
                controller.unit()
            );
            warn!("{message}");
            warnings.push(message);
        }

        Ok(ConfigureReport {
            steps,
            warnings,
            backup: reconciled.backup,
            status: controller.status(),
        })
    }
}
