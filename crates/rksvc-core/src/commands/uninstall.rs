//! Uninstall command implementation.
//!
//! Purge and account removal are confirmed before the lock is taken; a
//! declined prompt leaves the host untouched.

use crate::confirm::Confirm;
use crate::error::Result;
use crate::host::LifecycleContext;
use crate::uninstall::{UninstallOptions, UninstallReport, uninstall};

#[derive(Debug, Clone)]
pub enum UninstallOutcome {
    Completed(UninstallReport),
    Cancelled,
}

pub struct UninstallCommand<'a> {
    ctx: LifecycleContext<'a>,
    confirm: &'a dyn Confirm,
}

impl<'a> UninstallCommand<'a> {
    pub fn new(ctx: LifecycleContext<'a>, confirm: &'a dyn Confirm) -> Self {
        Self { ctx, confirm }
    }

    pub fn execute(&self, options: UninstallOptions) -> Result<UninstallOutcome> {
        crate::preflight::check_privilege(self.ctx.host)?;
        if options.is_destructive() && !self.confirm.confirm(&self.prompt(options)) {
            return Ok(UninstallOutcome::Cancelled);
        }
        let _lock = super::begin(&self.ctx)?;
        uninstall(&self.ctx, options).map(UninstallOutcome::Completed)
    }

    fn prompt(&self, options: UninstallOptions) -> String {
        let def = self.ctx.definition;
        let mut targets = Vec::new();
        if options.purge {
            targets.push(format!(
                "{}, {} and {}",
                def.config_dir.display(),
                def.data_dir.display(),
                def.log_dir.display()
            ));
        }
        if options.remove_account {
            targets.push(format!("account '{}' and group '{}'", def.account, def.group));
        }
        format!("Permanently delete {}?", targets.join(" plus "))
    }
}
