pub mod bounds;
pub mod catalog;
pub mod check;
pub mod ranges;

use std::path::Path;

use anyhow::{Context, Result};
use herring_qc_lib::core::qc::QcEngine;
use herring_qc_lib::core::settings::{QcSettings, SettingsManager};
use tracing::debug;

/// Loads settings from an explicit file (strict) or the config directory (lenient)
pub fn load_settings(path: Option<&Path>) -> Result<QcSettings> {
    match path {
        Some(path) => SettingsManager::with_path(path.to_path_buf())
            .try_load()
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => match SettingsManager::default_dir() {
            Some(dir) => {
                let manager = SettingsManager::new(dir);
                debug!("Using settings at {}", manager.settings_path().display());
                Ok(manager.load())
            }
            None => Ok(QcSettings::default()),
        },
    }
}

pub fn build_engine(settings: QcSettings) -> Result<QcEngine> {
    QcEngine::with_settings(settings).context("settings describe an invalid catalog or range table")
}
