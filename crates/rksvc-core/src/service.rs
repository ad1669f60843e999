//! Start/stop/enable/disable against the process supervisor.
//!
//! Every call is synchronous and returns the status observed afterwards.
//! Asking for the state the service is already in is a no-op.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{LifecycleError, Result};
use crate::host::LifecycleContext;
use crate::outcome::{Outcome, StepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub active: bool,
    pub enabled: bool,
}

pub struct ServiceController<'a> {
    ctx: LifecycleContext<'a>,
    unit: String,
}

impl<'a> ServiceController<'a> {
    pub fn new(ctx: LifecycleContext<'a>) -> Self {
        Self {
            unit: ctx.definition.unit_name(),
            ctx,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active: self.ctx.supervisor.is_active(&self.unit),
            enabled: self.ctx.supervisor.is_enabled(&self.unit),
        }
    }

    pub fn start(&self) -> Result<(ServiceStatus, StepReport)> {
        if self.ctx.supervisor.is_active(&self.unit) {
            debug!(unit = %self.unit, "already active");
            return Ok(self.report("start", Outcome::NoOp, "already active"));
        }
        info!(unit = %self.unit, "starting service");
        self.ctx
            .supervisor
            .start(&self.unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "start", source })?;
        Ok(self.report("start", Outcome::Changed, "started"))
    }

    pub fn stop(&self) -> Result<(ServiceStatus, StepReport)> {
        if !self.ctx.supervisor.is_active(&self.unit) {
            debug!(unit = %self.unit, "already stopped");
            return Ok(self.report("stop", Outcome::NoOp, "not running"));
        }
        info!(unit = %self.unit, "stopping service");
        self.ctx
            .supervisor
            .stop(&self.unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "stop", source })?;
        Ok(self.report("stop", Outcome::Changed, "stopped"))
    }

    /// Restart when running, otherwise start.
    pub fn restart_if_active(&self) -> Result<(ServiceStatus, StepReport)> {
        if !self.ctx.supervisor.is_active(&self.unit) {
            return self.start();
        }
        info!(unit = %self.unit, "restarting service");
        self.ctx
            .supervisor
            .restart(&self.unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "restart", source })?;
        Ok(self.report("restart", Outcome::Changed, "restarted"))
    }

    pub fn enable(&self) -> Result<(ServiceStatus, StepReport)> {
        if self.ctx.supervisor.is_enabled(&self.unit) {
            debug!(unit = %self.unit, "already enabled");
            return Ok(self.report("enable", Outcome::NoOp, "already enabled"));
        }
        info!(unit = %self.unit, "enabling service");
        self.ctx
            .supervisor
            .enable(&self.unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "enable", source })?;
        Ok(self.report("enable", Outcome::Changed, "enabled"))
    }

    pub fn disable(&self) -> Result<(ServiceStatus, StepReport)> {
        if !self.ctx.supervisor.is_enabled(&self.unit) {
            debug!(unit = %self.unit, "already disabled");
            return Ok(self.report("disable", Outcome::NoOp, "not enabled"));
        }
        info!(unit = %self.unit, "disabling service");
        self.ctx
            .supervisor
            .disable(&self.unit)
            .map_err(|source| LifecycleError::ServiceControlError { action: "disable", source })?;
        Ok(self.report("disable", Outcome::Changed, "disabled"))
    }

    fn report(&self, step: &str, outcome: Outcome, detail: &str) -> (ServiceStatus, StepReport) {
        (self.status(), StepReport::new(step, outcome, detail))
    }
}
