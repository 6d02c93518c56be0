//! QC Model Boundary
//!
//! The engine reads form values and writes test states through [`QcModel`].
//! [`SampleRecord`] is a serde-backed in-memory implementation used by the
//! CLI and by tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::ProcessingStage;
use crate::core::{Acceptance, SampleRef, SampleType, TestId, TestState};

/// Where mandatory field values are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandatorySource {
    /// Displayed text of a read-only view
    DisplayText,
    /// Input value of an editable form
    InputValue,
}

impl MandatorySource {
    /// Source used for a sample type's mandatory fields
    pub fn for_sample_type(sample_type: SampleType) -> Self {
        if sample_type.is_fish_detail() {
            MandatorySource::InputValue
        } else {
            MandatorySource::DisplayText
        }
    }
}

/// Form and results-display collaborator
pub trait QcModel {
    /// Current raw value of a form field; `None` when the form has no such input
    fn field_value(&self, sample: &SampleRef, field: &str) -> Option<String>;

    /// Values of every field flagged mandatory for the sample
    fn mandatory_values(&self, sample: &SampleRef, source: MandatorySource) -> Vec<String>;

    /// Current state of a test; tests never written read as pending
    fn test_state(&self, sample: &SampleRef, test_id: TestId) -> TestState;

    /// Writes a test state to the results display
    fn set_test_state(&mut self, sample: &SampleRef, test_id: TestId, state: TestState);

    /// Recorded user decision for an overridable test
    fn acceptance(&self, sample: &SampleRef, test_id: TestId) -> Acceptance;

    /// Records a user decision for an overridable test
    fn set_acceptance(&mut self, sample: &SampleRef, test_id: TestId, value: Acceptance);

    /// Length-frequency sum and total fish measured, when known
    fn length_frequency(&self, _sample: &SampleRef) -> Option<(i64, i64)> {
        None
    }

    /// Externally computed processing flag, when known
    fn processing_complete(&self, _sample: &SampleRef, _stage: ProcessingStage) -> Option<bool> {
        None
    }
}

/// In-memory sample with its form values and QC results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Raw form values keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Mandatory field values (display text or input value)
    #[serde(default)]
    pub mandatory: Vec<String>,
    /// Sum of the length-frequency counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_frequency_sum: Option<i64>,
    /// Declared number of fish measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_fish_measured: Option<i64>,
    /// Every lab detail has been processed
    #[serde(default)]
    pub lab_processing_complete: bool,
    /// Every otolith detail has been processed
    #[serde(default)]
    pub otolith_processing_complete: bool,
    /// Test states keyed by test id
    #[serde(default)]
    pub results: BTreeMap<TestId, TestState>,
    /// Acceptance decisions keyed by test id
    #[serde(default)]
    pub acceptance: BTreeMap<TestId, Acceptance>,
}

impl SampleRecord {
    /// Creates an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a form field value
    pub fn with_field(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Sets the mandatory field values
    pub fn with_mandatory<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mandatory = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a recorded acceptance decision
    pub fn with_acceptance(mut self, test_id: TestId, value: Acceptance) -> Self {
        self.acceptance.insert(test_id, value);
        self
    }

    /// Sets or clears a form field value
    pub fn set_field(&mut self, field: &str, value: Option<&str>) {
        match value {
            Some(v) => {
                self.fields.insert(field.to_string(), v.to_string());
            }
            None => {
                self.fields.remove(field);
            }
        }
    }

    /// Processing flag for a stage
    pub fn stage_complete(&self, stage: ProcessingStage) -> bool {
        match stage {
            ProcessingStage::Lab => self.lab_processing_complete,
            ProcessingStage::Otolith => self.otolith_processing_complete,
        }
    }
}

impl QcModel for SampleRecord {
    fn field_value(&self, _sample: &SampleRef, field: &str) -> Option<String> {
        self.fields.get(field).cloned()
    }

    fn mandatory_values(&self, _sample: &SampleRef, _source: MandatorySource) -> Vec<String> {
        self.mandatory.clone()
    }

    fn test_state(&self, _sample: &SampleRef, test_id: TestId) -> TestState {
        self.results.get(&test_id).copied().unwrap_or_default()
    }

    fn set_test_state(&mut self, _sample: &SampleRef, test_id: TestId, state: TestState) {
        self.results.insert(test_id, state);
    }

    fn acceptance(&self, _sample: &SampleRef, test_id: TestId) -> Acceptance {
        self.acceptance.get(&test_id).copied().unwrap_or_default()
    }

    fn set_acceptance(&mut self, _sample: &SampleRef, test_id: TestId, value: Acceptance) {
        if value == Acceptance::Unset {
            self.acceptance.remove(&test_id);
        } else {
            self.acceptance.insert(test_id, value);
        }
    }

    fn length_frequency(&self, _sample: &SampleRef) -> Option<(i64, i64)> {
        Some((self.length_frequency_sum?, self.total_fish_measured?))
    }

    fn processing_complete(&self, _sample: &SampleRef, stage: ProcessingStage) -> Option<bool> {
        Some(self.stage_complete(stage))
    }
}

// ============================================================================
// Tests
// ============================================================================
