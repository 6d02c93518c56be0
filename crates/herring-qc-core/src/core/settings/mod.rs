//! QC Settings Persistence
//!
//! Provides persistent engine settings with:
//! - Atomic file writes (temp file + rename)
//! - Defaults for every field and normalization of out-of-range values
//! - A version field for schema migrations
//!
//! Storage location: {config_dir}/herring-qc/qc-settings.json

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::qc::confirmation::AbandonPolicy;
use crate::core::qc::{NonNumericPolicy, RangeTable, TestCatalog};
use crate::core::{QcError, QcResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "qc-settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "qc-settings.json.lock";

/// Upper bound for the prompt settle delay
pub const MAX_SETTLE_DELAY_MS: u64 = 10_000;

/// Which test catalog the engine uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CatalogSetting {
    /// Current lab and otolith catalog
    #[default]
    Current,
    /// Earlier lab-only catalog with per-field probable tests
    Legacy,
    /// Catalog supplied in full
    Custom(TestCatalog),
}

impl CatalogSetting {
    /// Materializes the catalog
    pub fn catalog(&self) -> TestCatalog {
        match self {
            CatalogSetting::Current => TestCatalog::current(),
            CatalogSetting::Legacy => TestCatalog::legacy(),
            CatalogSetting::Custom(catalog) => catalog.clone(),
        }
    }
}

/// Confirmation prompt behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationSettings {
    /// Delay before prompting so earlier display updates settle
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Read messages aloud before prompting
    #[serde(default = "default_true")]
    pub talk_back: bool,

    /// What to do when the prompt is dismissed without an answer
    #[serde(default)]
    pub on_abandon: AbandonPolicy,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            talk_back: true,
            on_abandon: AbandonPolicy::default(),
        }
    }
}

impl ConfirmationSettings {
    /// Settle delay as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_settle_delay_ms() -> u64 {
    1200
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Test catalog in use
    #[serde(default)]
    pub catalog: CatalogSetting,

    /// Range table override; built-in ranges when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<RangeTable>,

    /// Confirmation workflow settings
    #[serde(default)]
    pub confirmation: ConfirmationSettings,

    /// Scoring of non-numeric field values
    #[serde(default)]
    pub non_numeric: NonNumericPolicy,
}

impl Default for QcSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            catalog: CatalogSetting::default(),
            ranges: None,
            confirmation: ConfirmationSettings::default(),
            non_numeric: NonNumericPolicy::default(),
        }
    }
}

impl QcSettings {
    /// Settings that reproduce the earlier lab-only behaviour
    pub fn legacy() -> Self {
        Self {
            catalog: CatalogSetting::Legacy,
            confirmation: ConfirmationSettings {
                on_abandon: AbandonPolicy::Reprompt,
                ..Default::default()
            },
            non_numeric: NonNumericPolicy::LegacyPass,
            ..Default::default()
        }
    }

    /// Clamps values so persisted state is always usable.
    ///
    /// Catalog and range consistency is checked by the engine, not here.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;
        self.confirmation.settle_delay_ms =
            self.confirmation.settle_delay_ms.min(MAX_SETTLE_DELAY_MS);
    }

    /// Range table in effect
    pub fn range_table(&self) -> RangeTable {
        self.ranges.clone().unwrap_or_default()
    }
}

/// Settings manager for loading and saving settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a settings manager for a config directory
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Create a settings manager for an explicit file
    pub fn with_path(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }

    /// Platform config directory for this tool
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("herring-qc"))
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> QcResult<T>) -> QcResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Load settings, failing on unreadable or malformed files.
    ///
    /// A missing file yields defaults.
    pub fn try_load(&self) -> QcResult<QcSettings> {
        self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(QcSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<QcSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = self.migrate(settings);
            } else if settings.version > SETTINGS_VERSION {
                return Err(QcError::Settings(format!(
                    "settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_VERSION
                )));
            }

            settings.normalize();
            Ok(settings)
        })
    }

    /// Load settings, returning defaults if the file is missing or corrupt
    pub fn load(&self) -> QcSettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                QcSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &QcSettings) -> QcResult<QcSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            drop(file);

            if cfg!(windows) && self.settings_path.exists() {
                // rename does not overwrite on Windows
                fs::remove_file(&self.settings_path)?;
            }
            fs::rename(&temp_path, &self.settings_path)?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Migrate settings from an older version
    fn migrate(&self, mut settings: QcSettings) -> QcSettings {
        settings.version = SETTINGS_VERSION;
        settings
    }
}

// ============================================================================
// Tests
// ============================================================================
