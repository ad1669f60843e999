//! The daemon's persisted settings document.
//!
//! - `schema`: recognised keys, their defaults and validation
//! - `parser`: TOML in and out, plus the commented reference document
//! - `store`: on-disk locations, atomic saves and backups
//! - `reconcile`: override resolution and the single write path

pub mod parser;
pub mod reconcile;
pub mod schema;
pub mod store;

use std::path::PathBuf;

use crate::host::Host;

pub use parser::{parse_document, parse_document_str, render_example, to_toml};
pub use reconcile::{ConfigOverrides, ReconcileReport, reconcile, refresh_example};
pub use schema::{ConfigDocument, SettingKey, SettingValue};
pub use store::ConfigStore;

/// Where the browser engine is looked for when `chrome_path` is empty.
pub const ENGINE_SEARCH_PATHS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

/// Resolve the engine binary: the configured path if set, else the first hit
/// on [`ENGINE_SEARCH_PATHS`].
pub fn locate_engine(host: &dyn Host, configured: Option<&str>) -> Option<PathBuf> {
    match configured {
        Some(path) => {
            let path = PathBuf::from(path);
            host.is_executable(&path).then_some(path)
        }
        None => ENGINE_SEARCH_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| host.is_executable(path)),
    }
}
