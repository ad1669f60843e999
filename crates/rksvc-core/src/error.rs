//! Error taxonomy for lifecycle operations.
//!
//! Fatal errors abort the current command. Verification problems never show up
//! here: they are folded into the report as individual check results.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("administrative privilege required (effective uid {uid})")]
    PrivilegeError { uid: u32 },

    #[error("unsupported platform: {0}")]
    PlatformMismatch(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("failed to provision account '{name}': {source}")]
    AccountProvisioningError {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to prepare {}: {source}", path.display())]
    FilesystemPermissionError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid binary {}: {reason}", path.display())]
    BinaryInvalid { path: PathBuf, reason: String },

    #[error("service control '{action}' failed: {source}")]
    ServiceControlError {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write configuration {}: {source}", path.display())]
    ConfigWriteError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("no existing installation of '{0}' to upgrade")]
    UpgradeWithoutInstall(String),

    #[error("another lifecycle operation holds {}", path.display())]
    ConcurrentInvocation { path: PathBuf },
}

impl LifecycleError {
    /// Short classification printed in front of the message.
    pub fn class(&self) -> &'static str {
        match self {
            Self::PrivilegeError { .. } => "PrivilegeError",
            Self::PlatformMismatch(_) => "PlatformMismatch",
            Self::MissingDependency(_) => "MissingDependency",
            Self::AccountProvisioningError { .. } => "AccountProvisioningError",
            Self::FilesystemPermissionError { .. } => "FilesystemPermissionError",
            Self::BinaryInvalid { .. } => "BinaryInvalid",
            Self::ServiceControlError { .. } => "ServiceControlError",
            Self::ConfigWriteError { .. } => "ConfigWriteError",
            Self::InvalidSetting { .. } => "InvalidSetting",
            Self::UpgradeWithoutInstall(_) => "UpgradeWithoutInstall",
            Self::ConcurrentInvocation { .. } => "ConcurrentInvocation",
        }
    }

    /// Actionable next step for the operator.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::PrivilegeError { .. } => "re-run the command with sudo or as root",
            Self::PlatformMismatch(_) => {
                "run on a host booted with systemd, or pass --yes to accept an untested release"
            }
            Self::MissingDependency(_) => {
                "install the missing package with the system package manager and re-run"
            }
            Self::AccountProvisioningError { .. } => {
                "check useradd/groupadd output in the system log, then re-run install"
            }
            Self::FilesystemPermissionError { .. } => {
                "check the path is on a writable filesystem owned by root, then re-run install"
            }
            Self::BinaryInvalid { .. } => "pass an existing executable with --binary PATH",
            Self::ServiceControlError { .. } => {
                "inspect `systemctl status reasonkit-web` and `journalctl -u reasonkit-web`"
            }
            Self::ConfigWriteError { .. } => {
                "check free space and permissions under the config directory, then re-run configure"
            }
            Self::InvalidSetting { .. } => "correct the value and re-run configure",
            Self::UpgradeWithoutInstall(_) => "run `rksvc install` first",
            Self::ConcurrentInvocation { .. } => {
                "wait for the other rksvc process to finish, then re-run"
            }
        }
    }
}

/// A single verification probe that could not run to completion.
#[derive(Debug, Error)]
#[error("check '{check}' could not run: {message}")]
pub struct VerificationCheckError {
    pub check: &'static str,
    pub message: String,
}

impl VerificationCheckError {
    pub fn new(check: &'static str, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}
