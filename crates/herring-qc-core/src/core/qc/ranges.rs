//! QC Range Definitions
//!
//! Possible (hard) and probable (soft) bounds for each measured field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{MeasuredField, QcError, QcResult};

/// Inclusive numeric interval with an optional provenance note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound (inclusive)
    pub min: f64,
    /// Upper bound (inclusive)
    pub max: f64,
    /// Where the bounds came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl Interval {
    /// Creates a new interval without comments
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            comments: None,
        }
    }

    /// Attaches a provenance note
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    /// Check if a value lies within the interval (bounds included)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, label: &str) -> QcResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(QcError::InvalidRange(format!(
                "{label}: bounds must be finite"
            )));
        }
        if self.min > self.max {
            return Err(QcError::InvalidRange(format!(
                "{label}: min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Reference bounds for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDefinition {
    /// Hard bounds; violation is a data-entry error
    pub possible: Interval,
    /// Soft bounds; violation needs human confirmation
    pub probable: Interval,
}

/// Range definitions keyed by field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeTable {
    ranges: BTreeMap<MeasuredField, RangeDefinition>,
}

impl Default for RangeTable {
    fn default() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert(
            MeasuredField::FishLength,
            RangeDefinition {
                possible: Interval::new(1.0, 600.0).with_comments(
                    "range of historical data based on 344097 observations is 17-480mm",
                ),
                probable: Interval::new(5.0, 386.0).with_comments(
                    "based on 344097 observations; [mean +- 2 x SD] = [197.5884, 385.8797]; \
                     lower bound relaxed to allow very small measurements",
                ),
            },
        );
        ranges.insert(
            MeasuredField::FishWeight,
            RangeDefinition {
                possible: Interval::new(1.0, 672.0).with_comments(
                    "range of historical data based on 317149 observations is 1 g to 672 g",
                ),
                probable: Interval::new(1.0, 412.0).with_comments(
                    "based on 317149 observations; [mean +- 2 x SD] = [29.63415, 411.96259]",
                ),
            },
        );
        ranges.insert(
            MeasuredField::GonadWeight,
            RangeDefinition {
                possible: Interval::new(0.0, 210.0).with_comments(
                    "range of historical data based on 280328 observations is 0.1 g to 204.5 g",
                ),
                probable: Interval::new(0.0, 89.0).with_comments(
                    "based on 280328 observations; [mean +- 2 x SD] = [-29.63415, 88.16331]",
                ),
            },
        );
        ranges.insert(
            MeasuredField::AnnulusCount,
            RangeDefinition {
                possible: Interval::new(0.0, 20.0).with_comments(
                    "range of historical data based on 280328 observations is 0 to 15",
                ),
                probable: Interval::new(1.0, 10.0).with_comments(
                    "based on 22866 observations; [mean +- 2 x SD] = [0.9677301, 9.1288325]",
                ),
            },
        );
        Self { ranges }
    }
}

impl RangeTable {
    /// Builds a table from explicit definitions
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = (MeasuredField, RangeDefinition)>,
    ) -> QcResult<Self> {
        let table = Self {
            ranges: definitions.into_iter().collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Gets the definition for a field
    pub fn get(&self, field: MeasuredField) -> QcResult<&RangeDefinition> {
        self.ranges.get(&field).ok_or_else(|| {
            QcError::InvalidRange(format!("no range definition for {}", field))
        })
    }

    /// Iterates definitions in field order
    pub fn iter(&self) -> impl Iterator<Item = (&MeasuredField, &RangeDefinition)> {
        self.ranges.iter()
    }

    /// Checks every field is covered and every interval is well formed
    pub fn validate(&self) -> QcResult<()> {
        for field in MeasuredField::ALL {
            let def = self.get(field)?;
            def.possible.validate(&format!("{field} possible"))?;
            def.probable.validate(&format!("{field} probable"))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
