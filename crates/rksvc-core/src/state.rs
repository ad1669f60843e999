//! Observed installation state.
//!
//! Always probed fresh from the host; never persisted.

use serde::Serialize;

use crate::fs::{is_executable_file, mode_of};
use crate::host::LifecycleContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryState {
    pub role: &'static str,
    pub exists: bool,
    /// Mode and ownership match the provisioning matrix.
    pub conforms: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationState {
    pub group_exists: bool,
    pub account_exists: bool,
    pub directories: Vec<DirectoryState>,
    pub binary_installed: bool,
    pub binary_version: Option<String>,
    pub symlink_target: Option<std::path::PathBuf>,
    pub config_present: bool,
    pub unit_present: bool,
    pub enabled: bool,
    pub active: bool,
}

impl InstallationState {
    pub fn probe(ctx: &LifecycleContext<'_>) -> Self {
        let def = ctx.definition;
        let unit = def.unit_name();

        let directories = def
            .directory_specs()
            .into_iter()
            .map(|spec| {
                let exists = spec.path.is_dir();
                let conforms = exists
                    && mode_of(&spec.path) == Some(spec.mode)
                    && ctx
                        .host
                        .owner(&spec.path)
                        .map(|owner| owner.user == spec.owner && owner.group == spec.group)
                        .unwrap_or(false);
                DirectoryState {
                    role: spec.role.as_str(),
                    exists,
                    conforms,
                }
            })
            .collect();

        let binary_installed = is_executable_file(&def.binary_path);
        let binary_version = if binary_installed {
            ctx.host.binary_version(&def.binary_path)
        } else {
            None
        };
        let unit_present = def.unit_path.is_file();

        Self {
            group_exists: ctx.host.group_exists(&def.group),
            account_exists: ctx.host.user_exists(&def.account),
            directories,
            binary_installed,
            binary_version,
            symlink_target: std::fs::read_link(&def.symlink_path).ok(),
            config_present: def.config_file.is_file(),
            unit_present,
            enabled: unit_present && ctx.supervisor.is_enabled(&unit),
            active: unit_present && ctx.supervisor.is_active(&unit),
        }
    }

    /// Enough of a previous install exists to upgrade in place.
    pub fn is_installed(&self) -> bool {
        self.account_exists && self.unit_present
    }

    /// Nothing of the installation remains except, possibly, retained state.
    pub fn is_removed(&self) -> bool {
        !self.binary_installed && self.symlink_target.is_none() && !self.unit_present
    }
}
