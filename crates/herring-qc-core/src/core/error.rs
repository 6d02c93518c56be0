//! Herring QC Error Definitions
//!
//! Defines error types used throughout the project. Test failures are not
//! errors; they are recorded as test states. Only programming and
//! configuration mistakes surface here.

use thiserror::Error;

use super::{SampleType, TestId};

/// Quality-control engine error types
#[derive(Error, Debug)]
pub enum QcError {
    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("Unknown field name: {0}")]
    UnknownField(String),

    #[error("Unknown sample type: {0}")]
    UnknownSampleType(String),

    #[error("Unknown test: {0}")]
    UnknownTest(TestId),

    #[error("Test {test_id} does not apply to {sample_type}")]
    NotApplicable {
        test_id: TestId,
        sample_type: SampleType,
    },

    #[error("Test {test_id} is not a {expected} test")]
    WrongTestKind {
        test_id: TestId,
        expected: &'static str,
    },

    #[error("Field {field} is not tested for {sample_type}")]
    FieldNotTested {
        field: String,
        sample_type: SampleType,
    },

    #[error("No {kind} test applies to {sample_type}")]
    NoTestOfKind {
        kind: &'static str,
        sample_type: SampleType,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid test catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid range definition: {0}")]
    InvalidRange(String),

    #[error("Settings error: {0}")]
    Settings(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Quality-control result type
pub type QcResult<T> = Result<T, QcError>;
