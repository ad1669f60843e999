//! High-level lifecycle commands.
//!
//! Each command composes the individual steps in a fixed order. Mutating
//! commands check privilege, then hold the invocation lock for the whole
//! sequence. These are the entry points the CLI calls.

pub mod configure;
pub mod install;
pub mod uninstall;
pub mod upgrade;
pub mod verify;

pub use configure::{ConfigureCommand, ConfigureOptions, ConfigureReport};
pub use install::{InstallCommand, InstallOptions, InstallReport};
pub use uninstall::{UninstallCommand, UninstallOutcome};
pub use upgrade::{UpgradeCommand, UpgradeOptions, UpgradeReport};
pub use verify::VerifyCommand;

use crate::error::Result;
use crate::host::LifecycleContext;
use crate::lock::InvocationLock;
use crate::preflight::check_privilege;

/// Refuse unprivileged callers before touching anything, then take the lock.
fn begin(ctx: &LifecycleContext<'_>) -> Result<InvocationLock> {
    check_privilege(ctx.host)?;
    InvocationLock::acquire(&ctx.definition.lock_path)
}
