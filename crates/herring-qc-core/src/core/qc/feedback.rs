//! QC Feedback Types
//!
//! Probable bounds and the pending-confirmation records produced when an
//! overridable test fails without an accepted decision.

use serde::{Deserialize, Serialize};

use crate::core::TestId;

/// Rounds half up (towards positive infinity) to the given number of decimals
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor + 0.5).floor() / factor
}

/// Formats a bound for display with one decimal place
pub fn format_bound(value: f64) -> String {
    format!("{:.1}", round_half_up(value, 1))
}

/// Probable interval computed for a given sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower bound (inclusive)
    pub min: f64,
    /// Upper bound (inclusive)
    pub max: f64,
}

impl Bounds {
    /// Creates new bounds
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check if a value lies within the bounds; compares unrounded values
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Midpoint of the interval
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} and {}", format_bound(self.min), format_bound(self.max))
    }
}

/// An improbable measurement awaiting a yes/no decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Unique record ID
    pub id: String,
    /// Test that failed
    pub test_id: TestId,
    /// Short message, suitable for voice read-back
    pub message_lite: String,
    /// Full prompt text including the expected bounds
    pub message: String,
    /// Bounds the observation was compared against
    pub bounds: Option<Bounds>,
    /// Observed (dependent) value
    pub observed: Option<f64>,
}

impl PendingConfirmation {
    /// Creates a new record
    pub fn new(
        test_id: TestId,
        message_lite: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            test_id,
            message_lite: message_lite.into(),
            message: message.into(),
            bounds: None,
            observed: None,
        }
    }

    /// Sets the bounds used for the comparison
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Sets the observed value
    pub fn with_observed(mut self, observed: f64) -> Self {
        self.observed = Some(observed);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
