//! Config store for loading and saving the settings document.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};

use crate::definition::ServiceDefinition;
use crate::fs::{set_mode, write_atomic_with};

use super::{ConfigDocument, parser};

pub const DOCUMENT_MODE: u32 = 0o640;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    example_path: PathBuf,
}

impl ConfigStore {
    pub fn for_definition(definition: &ServiceDefinition) -> Self {
        Self::from_paths(
            definition.config_file.clone(),
            definition.example_config_file.clone(),
        )
    }

    pub fn from_paths(config_path: PathBuf, example_path: PathBuf) -> Self {
        Self {
            config_path,
            example_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn example_path(&self) -> &Path {
        &self.example_path
    }

    /// The live document, or `None` when it has never been written.
    pub fn load(&self) -> anyhow::Result<Option<ConfigDocument>> {
        if !self.config_path.exists() {
            return Ok(None);
        }
        parser::parse_document(&self.config_path).map(Some)
    }

    /// Atomically replace the live document.
    ///
    /// `before_rename` runs on the finished temp file, typically to set its owner.
    pub fn save(
        &self,
        document: &ConfigDocument,
        before_rename: impl FnOnce(&Path) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let content = parser::to_toml(document).context("Failed to serialize config to TOML")?;
        self.ensure_parent()?;
        write_atomic_with(
            &self.config_path,
            content.as_bytes(),
            DOCUMENT_MODE,
            before_rename,
        )
        .with_context(|| format!("Failed to write config file: {}", self.config_path.display()))
    }

    /// Copy the live document to a timestamped sibling.
    pub fn backup(&self, now: DateTime<Local>) -> anyhow::Result<PathBuf> {
        let backup = self.next_backup_path(now);
        std::fs::copy(&self.config_path, &backup).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                self.config_path.display(),
                backup.display()
            )
        })?;
        set_mode(&backup, DOCUMENT_MODE)?;
        Ok(backup)
    }

    /// `config.toml.<YYYYmmddHHMMSS>.bak`, numbered if that name is taken.
    fn next_backup_path(&self, now: DateTime<Local>) -> PathBuf {
        let stamp = now.format("%Y%m%d%H%M%S").to_string();
        let base = self.config_path.as_os_str().to_string_lossy().into_owned();
        let first = PathBuf::from(format!("{base}.{stamp}.bak"));
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| PathBuf::from(format!("{base}.{stamp}.{n}.bak")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }

    /// Rewrite the example document if its content differs.
    ///
    /// Returns whether anything was written.
    pub fn write_example(
        &self,
        before_rename: impl FnOnce(&Path) -> anyhow::Result<()>,
    ) -> anyhow::Result<bool> {
        let content = parser::render_example();
        if std::fs::read_to_string(&self.example_path).ok().as_deref() == Some(content.as_str()) {
            return Ok(false);
        }
        self.ensure_parent()?;
        write_atomic_with(
            &self.example_path,
            content.as_bytes(),
            DOCUMENT_MODE,
            before_rename,
        )
        .with_context(|| format!("Failed to write example config: {}", self.example_path.display()))?;
        Ok(true)
    }

    fn ensure_parent(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        Ok(())
    }
}
