//! Sample files: a sample reference plus its record.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use herring_qc_lib::core::qc::SampleRecord;
use herring_qc_lib::core::{SampleRef, SampleType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFile {
    pub sample_type: SampleType,
    pub id: String,
    #[serde(default)]
    pub record: SampleRecord,
}

impl SampleFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Writes through a temp file so a failed write leaves the existing file intact
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        if cfg!(windows) && path.exists() {
            fs::remove_file(path)?;
        }
        fs::rename(&temp_path, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn sample_ref(&self) -> SampleRef {
        SampleRef::new(self.sample_type, self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herring_qc_lib::core::{Acceptance, TestState};
    use tempfile::TempDir;

    #[test]
    fn test_load_sample_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fish.json");
        fs::write(
            &path,
            r#"{
                "sample_type": "lab_sample",
                "id": "fd-17",
                "record": {
                    "fields": {"fish_length": "300", "fish_weight": "210"},
                    "mandatory": ["F", "4"],
                    "acceptance": {"207": "rejected"}
                }
            }"#,
        )
        .unwrap();

        let sample = SampleFile::load(&path).unwrap();
        assert_eq!(sample.sample_ref().to_string(), "lab_sample:fd-17");
        assert_eq!(sample.record.fields["fish_weight"], "210");
        assert_eq!(sample.record.acceptance[&207], Acceptance::Rejected);
    }

    #[test]
    fn test_save_round_trips_results() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fish.json");
        let mut sample = SampleFile {
            sample_type: SampleType::OtolithSample,
            id: "o-3".to_string(),
            record: SampleRecord::new().with_field("annulus_count", "5"),
        };
        sample.record.results.insert(309, TestState::Pass);

        sample.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(SampleFile::load(&path).unwrap(), sample);
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = SampleFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
