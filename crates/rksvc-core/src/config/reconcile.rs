//! Merge operator overrides into the live settings document.
//!
//! Resolution per key: override, then the value already on disk, then the
//! default. The live file is only rewritten when that changes something, and
//! every rewrite of an existing file is preceded by a backup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use tracing::{debug, info};

use crate::definition::ADMIN_USER;
use crate::error::{LifecycleError, Result};
use crate::fs::{mode_of, set_mode};
use crate::host::{LifecycleContext, Ownership};
use crate::outcome::{Outcome, StepReport};

use super::store::DOCUMENT_MODE;
use super::{ConfigDocument, ConfigStore, SettingKey, SettingValue};

/// Values supplied for this run, from the environment or from prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    values: BTreeMap<SettingKey, SettingValue>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every recognised variable through `lookup`.
    ///
    /// Unset and empty variables are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut overrides = Self::new();
        for key in SettingKey::ALL {
            if let Some(raw) = lookup(key.env_var()).filter(|raw| !raw.trim().is_empty()) {
                overrides.set(key, key.parse(&raw)?);
            }
        }
        Ok(overrides)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn with(mut self, key: SettingKey, value: SettingValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: SettingKey, value: SettingValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: SettingKey) -> Option<&SettingValue> {
        self.values.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn apply_to(&self, document: &mut ConfigDocument) -> Vec<SettingKey> {
        let mut changed = Vec::new();
        for (key, value) in &self.values {
            if document.get(*key) != Some(value) {
                document.set(*key, value.clone());
                changed.push(*key);
            }
        }
        changed
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub steps: Vec<StepReport>,
    pub backup: Option<PathBuf>,
    /// The document as it now stands on disk.
    pub document: ConfigDocument,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|step| step.outcome.changed())
    }

    /// The live document itself was written, not just its mode or the example.
    pub fn document_written(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.step == "config_file" && step.outcome.changed())
    }
}

pub fn reconcile(ctx: &LifecycleContext<'_>, overrides: &ConfigOverrides) -> Result<ReconcileReport> {
    let def = ctx.definition;
    let store = ConfigStore::for_definition(def);
    let wrap = |source: anyhow::Error| LifecycleError::ConfigWriteError {
        path: store.config_path().to_path_buf(),
        source,
    };

    let wanted = Ownership::new(ADMIN_USER, &def.group);
    let restrict = |tmp: &Path| ctx.host.set_owner(tmp, &wanted);

    let mut steps = Vec::new();
    let mut backup = None;
    let document = match store.load().map_err(wrap)? {
        None => {
            let mut document = ConfigDocument::defaults();
            overrides.apply_to(&mut document);
            store.save(&document, restrict).map_err(wrap)?;
            info!(path = %store.config_path().display(), "wrote default configuration");
            steps.push(StepReport::new("config_file", Outcome::Changed, "created with defaults"));
            document
        }
        Some(existing) => {
            let mut document = existing.clone();
            let changed = overrides.apply_to(&mut document);
            if changed.is_empty() {
                debug!(path = %store.config_path().display(), "configuration already up to date");
                steps.push(StepReport::new("config_file", Outcome::NoOp, "unchanged"));
                existing
            } else {
                document.fill_defaults();
                let saved = store.backup(Local::now()).map_err(wrap)?;
                store.save(&document, restrict).map_err(wrap)?;
                let names: Vec<&str> = changed.iter().map(|key| key.name()).collect();
                info!(
                    path = %store.config_path().display(),
                    backup = %saved.display(),
                    keys = ?names,
                    "updated configuration"
                );
                steps.push(StepReport::new(
                    "config_file",
                    Outcome::Changed,
                    format!("updated {}", names.join(", ")),
                ));
                backup = Some(saved);
                document
            }
        }
    };

    steps.push(ensure_document_access(ctx, store.config_path(), "config_permissions")?);
    steps.push(refresh_example_with(ctx, &store)?);

    Ok(ReconcileReport {
        steps,
        backup,
        document,
    })
}

/// Regenerate the reference document only.
pub fn refresh_example(ctx: &LifecycleContext<'_>) -> Result<StepReport> {
    refresh_example_with(ctx, &ConfigStore::for_definition(ctx.definition))
}

fn refresh_example_with(ctx: &LifecycleContext<'_>, store: &ConfigStore) -> Result<StepReport> {
    let wanted = Ownership::new(ADMIN_USER, &ctx.definition.group);
    let written = store
        .write_example(|tmp| ctx.host.set_owner(tmp, &wanted))
        .map_err(|source| LifecycleError::ConfigWriteError {
            path: store.example_path().to_path_buf(),
            source,
        })?;
    if written {
        info!(path = %store.example_path().display(), "refreshed example configuration");
    }
    let access = ensure_document_access(ctx, store.example_path(), "example_permissions")?;
    Ok(StepReport::new(
        "example_config",
        Outcome::from_changed(written).or(access.outcome),
        store.example_path().display().to_string(),
    ))
}

/// Mode 640, owned by root and the service group.
fn ensure_document_access(
    ctx: &LifecycleContext<'_>,
    path: &Path,
    step: &'static str,
) -> Result<StepReport> {
    let wrap = |source: anyhow::Error| LifecycleError::ConfigWriteError {
        path: path.to_path_buf(),
        source,
    };
    let mut changed = false;
    if mode_of(path) != Some(DOCUMENT_MODE) {
        set_mode(path, DOCUMENT_MODE).map_err(wrap)?;
        changed = true;
    }
    let wanted = Ownership::new(ADMIN_USER, &ctx.definition.group);
    if ctx.host.owner(path).ok().as_ref() != Some(&wanted) {
        ctx.host
            .set_owner(path, &wanted)
            .with_context(|| format!("Failed to restrict {} to group {}", path.display(), wanted.group))
            .map_err(wrap)?;
        changed = true;
    }
    Ok(StepReport::new(
        step,
        Outcome::from_changed(changed),
        path.display().to_string(),
    ))
}
