//! Herring QC Core Type Definitions
//!
//! Defines fundamental types shared by the rule engine, the settings layer
//! and the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::QcError;

// =============================================================================
// ID Types
// =============================================================================

/// Numeric quality-control test identifier (e.g. 204)
pub type TestId = u16;

/// Opaque sample identifier assigned by the backend
pub type SampleId = String;

/// Value a form uses to record "explicitly unknown / not applicable"
pub const UNKNOWN_SENTINEL: f64 = -99.0;

/// Form field holding the maturity stage (1-8) used by the gonad weight test
pub const MATURITY_FIELD: &str = "maturity";

// =============================================================================
// Sample Types
// =============================================================================

/// Kind of sample under evaluation; selects the test catalog slice and the
/// mandatory-field source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    /// Port sample (sample-level view)
    PortSample,
    /// Sea sample (sample-level view)
    SeaSample,
    /// Lab sample (fish detail form)
    LabSample,
    /// Otolith sample (fish detail form)
    OtolithSample,
}

impl SampleType {
    /// All sample types in display order
    pub const ALL: [SampleType; 4] = [
        SampleType::PortSample,
        SampleType::SeaSample,
        SampleType::LabSample,
        SampleType::OtolithSample,
    ];

    /// Wire name used in JSON and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::PortSample => "port_sample",
            SampleType::SeaSample => "sea_sample",
            SampleType::LabSample => "lab_sample",
            SampleType::OtolithSample => "otolith_sample",
        }
    }

    /// Whether this sample type is edited through a fish detail form
    pub fn is_fish_detail(&self) -> bool {
        matches!(self, SampleType::LabSample | SampleType::OtolithSample)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SampleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| QcError::UnknownSampleType(s.to_string()))
    }
}

/// Reference to the sample a check runs against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRef {
    /// Sample type
    pub sample_type: SampleType,
    /// Backend identifier
    pub id: SampleId,
}

impl SampleRef {
    /// Creates a new sample reference
    pub fn new(sample_type: SampleType, id: impl Into<SampleId>) -> Self {
        Self {
            sample_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sample_type, self.id)
    }
}

// =============================================================================
// Test State
// =============================================================================

/// Result of a single test for a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    /// Test passed
    Pass,
    /// Test failed
    Fail,
    /// Not yet evaluable (rendered blank)
    #[default]
    Pending,
}

impl TestState {
    /// Maps a boolean outcome onto pass/fail
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            TestState::Pass
        } else {
            TestState::Fail
        }
    }

    /// Text shown in the results display
    pub fn display_text(&self) -> &'static str {
        match self {
            TestState::Pass => "passed",
            TestState::Fail => "failed",
            TestState::Pending => "",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestState::Pass => write!(f, "PASS"),
            TestState::Fail => write!(f, "FAIL"),
            TestState::Pending => write!(f, "PENDING"),
        }
    }
}

/// User decision on a failed, overridable test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceptance {
    /// No decision recorded
    #[default]
    Unset,
    /// User confirmed the improbable measurement
    Accepted,
    /// User rejected the measurement
    Rejected,
}

impl Acceptance {
    /// Text stored in the "accepted" form column
    pub fn display_text(&self) -> &'static str {
        match self {
            Acceptance::Unset => "",
            Acceptance::Accepted => "yes",
            Acceptance::Rejected => "no",
        }
    }

    /// Parses the "accepted" column text; anything else is unset
    pub fn from_display_text(text: &str) -> Self {
        match text.trim() {
            "yes" => Acceptance::Accepted,
            "no" => Acceptance::Rejected,
            _ => Acceptance::Unset,
        }
    }

    /// Whether the user accepted the measurement
    pub fn is_accepted(&self) -> bool {
        matches!(self, Acceptance::Accepted)
    }
}

// =============================================================================
// Measured Fields
// =============================================================================

/// Numeric fish detail field that carries presence and range tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuredField {
    FishLength,
    FishWeight,
    GonadWeight,
    AnnulusCount,
}

impl MeasuredField {
    /// All measured fields in form order
    pub const ALL: [MeasuredField; 4] = [
        MeasuredField::FishLength,
        MeasuredField::FishWeight,
        MeasuredField::GonadWeight,
        MeasuredField::AnnulusCount,
    ];

    /// Form field name
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasuredField::FishLength => "fish_length",
            MeasuredField::FishWeight => "fish_weight",
            MeasuredField::GonadWeight => "gonad_weight",
            MeasuredField::AnnulusCount => "annulus_count",
        }
    }

    /// Human-readable name used in prompts
    pub fn verbose_name(&self) -> &'static str {
        match self {
            MeasuredField::FishLength => "fish length",
            MeasuredField::FishWeight => "fish weight",
            MeasuredField::GonadWeight => "gonad weight",
            MeasuredField::AnnulusCount => "annulus count",
        }
    }
}

impl fmt::Display for MeasuredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasuredField {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasuredField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| QcError::UnknownField(s.to_string()))
    }
}

// =============================================================================
// Field Values
// =============================================================================

/// Classification of a raw form value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Field left blank (or missing from the form)
    Empty,
    /// Explicitly recorded as unknown (`-99`)
    Unknown,
    /// Parsed numeric value
    Number(f64),
    /// Non-empty text that is not a number
    Invalid(String),
}

impl FieldValue {
    /// Classifies a raw form value
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return FieldValue::Empty;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FieldValue::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v == UNKNOWN_SENTINEL => FieldValue::Unknown,
            Ok(v) if v.is_finite() => FieldValue::Number(v),
            _ => FieldValue::Invalid(trimmed.to_string()),
        }
    }

    /// Numeric value, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the field holds any value at all
    pub fn is_present(&self) -> bool {
        !matches!(self, FieldValue::Empty)
    }
}

// =============================================================================
// Tests
// =============================================================================
