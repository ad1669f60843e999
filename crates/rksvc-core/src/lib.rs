//! rksvc Core Library
//!
//! Lifecycle management for the reasonkit-web daemon: provisioning, binary
//! installation, supervisor units, configuration reconciliation, verification
//! and removal. All host access goes through the [`host`] traits.

pub mod binary;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod definition;
pub mod error;
pub mod fs;
pub mod host;
pub mod lock;
pub mod outcome;
pub mod preflight;
pub mod provision;
pub mod service;
pub mod state;
pub mod uninstall;
pub mod units;
pub mod verify;

pub use error::{LifecycleError, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Definition and host seams
    pub use crate::definition::ServiceDefinition;
    pub use crate::host::{Host, LifecycleContext, Supervisor, SystemHost, Systemctl};

    // Commands
    pub use crate::commands::{
        ConfigureCommand, ConfigureOptions, ConfigureReport, InstallCommand, InstallOptions,
        InstallReport, UninstallCommand, UninstallOutcome, UpgradeCommand, UpgradeOptions,
        UpgradeReport, VerifyCommand,
    };
    pub use crate::uninstall::{UninstallOptions, UninstallReport};

    // Configuration
    pub use crate::config::{ConfigDocument, ConfigOverrides, SettingKey, SettingValue};

    // Reporting
    pub use crate::confirm::{Confirm, FixedAnswer};
    pub use crate::error::{LifecycleError, Result};
    pub use crate::outcome::{Outcome, StepReport};
    pub use crate::state::InstallationState;
    pub use crate::verify::{CheckResult, CheckStatus, VerificationReport};
}
