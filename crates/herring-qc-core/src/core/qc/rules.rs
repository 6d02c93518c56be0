//! QC Rules
//!
//! Pure evaluation functions for each kind of test. Nothing here touches the
//! form model; the engine reads inputs, calls these and writes the states.

use serde::{Deserialize, Serialize};

use super::feedback::{format_bound, Bounds, PendingConfirmation};
use super::ranges::{Interval, RangeDefinition};
use crate::core::{FieldValue, MeasuredField, TestId, TestState, MATURITY_FIELD};

/// How non-numeric, non-empty values are scored by the possible-range test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NonNumericPolicy {
    /// Score the possible-range test as failed
    #[default]
    Fail,
    /// Score it as passed, as the old NaN comparisons did
    LegacyPass,
}

// ============================================================================
// Data Points
// ============================================================================

/// Presence / possible / probable states for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPointOutcome {
    pub presence: TestState,
    pub possible: TestState,
    pub probable: TestState,
}

/// Evaluates the presence, possible-range and probable-range tests of a field
pub fn evaluate_data_point(
    value: &FieldValue,
    range: &RangeDefinition,
    policy: NonNumericPolicy,
) -> DataPointOutcome {
    match value {
        FieldValue::Empty => DataPointOutcome {
            presence: TestState::Fail,
            possible: TestState::Pending,
            probable: TestState::Pending,
        },
        FieldValue::Unknown => DataPointOutcome {
            presence: TestState::Pass,
            possible: TestState::Pass,
            probable: TestState::Pass,
        },
        FieldValue::Invalid(_) => DataPointOutcome {
            presence: TestState::Pass,
            possible: match policy {
                NonNumericPolicy::Fail => TestState::Fail,
                NonNumericPolicy::LegacyPass => TestState::Pass,
            },
            probable: TestState::Pending,
        },
        FieldValue::Number(v) => {
            let possible = TestState::from_bool(range.possible.contains(*v));
            let probable = match possible {
                TestState::Pass => TestState::from_bool(range.probable.contains(*v)),
                _ => TestState::Pending,
            };
            DataPointOutcome {
                presence: TestState::Pass,
                possible,
                probable,
            }
        }
    }
}

/// Prompt for a single field outside its probable range
pub fn probable_confirmation(
    test_id: TestId,
    field: MeasuredField,
    probable: &Interval,
    observed: f64,
) -> PendingConfirmation {
    let name = field.verbose_name();
    let bounds = Bounds::new(probable.min, probable.max);
    let message = format!(
        "{name} is outside of the probable range. \n\nA value was expected between {bounds}. \
         \n\nAre you confident in your measurements? \n\nPress [y] for YES or [n] for NO."
    );
    PendingConfirmation::new(test_id, format!("Improbable measurement for {name}"), message)
        .with_bounds(bounds)
        .with_observed(observed)
}

// ============================================================================
// Ratio Rules
// ============================================================================

/// Cross-field regression rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioRule {
    /// Fish weight against fish length (log-log regression)
    LengthWeight,
    /// Gonad weight against somatic weight, per maturity stage
    GonadSomaticMaturity,
    /// Annulus count against fish length (linear)
    LengthAnnulus,
}

/// Exponential regression `exp(intercept + slope * ln(x))`
#[derive(Debug, Clone, Copy)]
struct LogLinear {
    intercept: f64,
    slope: f64,
}

impl LogLinear {
    const fn new(intercept: f64, slope: f64) -> Self {
        Self { intercept, slope }
    }

    fn eval(&self, x: f64) -> f64 {
        (self.intercept + self.slope * x.ln()).exp()
    }
}

/// Gonad weight bounds per maturity stage 2-8 (stage 1 is fixed at [0, 1]).
/// `None` for the lower bound means zero.
const GONAD_STAGES: [(Option<LogLinear>, LogLinear); 7] = [
    (None, LogLinear::new(-4.13529659279963, 0.901314871086489)),
    (
        Some(LogLinear::new(-9.73232467962432, 1.89741087890489)),
        LogLinear::new(-7.36823392683834, 1.89014326451594),
    ),
    (
        Some(LogLinear::new(-3.47650267387848, 1.032305979081)),
        LogLinear::new(-1.26270682092335, 1.01753432622181),
    ),
    (
        Some(LogLinear::new(-5.20139782140475, 1.57823918381865)),
        LogLinear::new(-4.17515855708087, 1.56631264086027),
    ),
    (
        Some(LogLinear::new(-4.98077570284809, 1.53819945023286)),
        LogLinear::new(-3.99324471338789, 1.53661353195509),
    ),
    (
        Some(LogLinear::new(-5.89580204167729, 1.27478993476955)),
        LogLinear::new(-2.94435270310896, 1.19636077686861),
    ),
    (
        Some(LogLinear::new(-7.18685438956137, 1.40456267851141)),
        LogLinear::new(-5.52714180205898, 1.39515770753421),
    ),
];

const LENGTH_WEIGHT_MIN: LogLinear = LogLinear::new(-12.978, 3.18);
const LENGTH_WEIGHT_MAX: LogLinear = LogLinear::new(-12.505, 3.18);

const LENGTH_ANNULUS_MIN: (f64, f64) = (-14.3554448587879, 0.0634008000506408);
const LENGTH_ANNULUS_MAX: (f64, f64) = (-10.1477660949041, 0.0633784283545123);

/// Maturity stages with a gonad weight regression
pub const MATURITY_STAGES: std::ops::RangeInclusive<u8> = 1..=8;

impl RatioRule {
    /// Field the bounds are computed from
    pub fn independent(&self) -> MeasuredField {
        match self {
            RatioRule::LengthWeight | RatioRule::LengthAnnulus => MeasuredField::FishLength,
            RatioRule::GonadSomaticMaturity => MeasuredField::FishWeight,
        }
    }

    /// Field compared against the bounds
    pub fn dependent(&self) -> MeasuredField {
        match self {
            RatioRule::LengthWeight => MeasuredField::FishWeight,
            RatioRule::GonadSomaticMaturity => MeasuredField::GonadWeight,
            RatioRule::LengthAnnulus => MeasuredField::AnnulusCount,
        }
    }

    /// Every form field the rule reads
    pub fn input_fields(&self) -> &'static [&'static str] {
        match self {
            RatioRule::LengthWeight => &["fish_length", "fish_weight"],
            RatioRule::GonadSomaticMaturity => &["fish_weight", "gonad_weight", MATURITY_FIELD],
            RatioRule::LengthAnnulus => &["fish_length", "annulus_count"],
        }
    }

    fn independent_name(&self) -> &'static str {
        match self {
            RatioRule::GonadSomaticMaturity => "somatic weight",
            _ => self.independent().verbose_name(),
        }
    }

    /// Probable bounds for the dependent field.
    ///
    /// Returns `None` when the gonad rule has no maturity stage in 1-8, or
    /// when a log-scale regression gets a non-positive independent value.
    pub fn bounds(&self, independent: f64, maturity: Option<u8>) -> Option<Bounds> {
        match self {
            RatioRule::LengthWeight if independent <= 0.0 => None,
            RatioRule::LengthWeight => Some(Bounds::new(
                LENGTH_WEIGHT_MIN.eval(independent),
                LENGTH_WEIGHT_MAX.eval(independent),
            )),
            RatioRule::LengthAnnulus => Some(Bounds::new(
                LENGTH_ANNULUS_MIN.0 + LENGTH_ANNULUS_MIN.1 * independent,
                LENGTH_ANNULUS_MAX.0 + LENGTH_ANNULUS_MAX.1 * independent,
            )),
            RatioRule::GonadSomaticMaturity => {
                let stage = maturity.filter(|s| MATURITY_STAGES.contains(s))?;
                if stage == 1 {
                    return Some(Bounds::new(0.0, 1.0));
                }
                if independent <= 0.0 {
                    return None;
                }
                let (min, max) = &GONAD_STAGES[usize::from(stage - 2)];
                Some(Bounds::new(
                    min.map(|m| m.eval(independent)).unwrap_or(0.0),
                    max.eval(independent),
                ))
            }
        }
    }

    /// Builds the confirmation prompt for an out-of-bounds observation
    pub fn confirmation(
        &self,
        test_id: TestId,
        bounds: Bounds,
        observed: f64,
        maturity: Option<u8>,
    ) -> PendingConfirmation {
        let independent = self.independent_name();
        let dependent = self.dependent().verbose_name();
        let given = match (self, maturity) {
            (RatioRule::GonadSomaticMaturity, Some(stage)) => {
                format!("{independent} at maturity level {stage}")
            }
            _ => independent.to_string(),
        };
        let message = format!(
            "The {independent} : {dependent} ratio is outside of the probable range. \
             \n\nFor the given value of {given}, {dependent} most commonly ranges between {} and {}. \
             \n\nAre you confident in your measurements? \n\nPress [y] for YES or [n] for NO.",
            format_bound(bounds.min),
            format_bound(bounds.max),
        );
        PendingConfirmation::new(
            test_id,
            format!("Improbable measurement for {independent} : {dependent} ratio"),
            message,
        )
        .with_bounds(bounds)
        .with_observed(observed)
    }
}

/// Parses a maturity stage; anything outside 1-8 is no stage
pub fn parse_maturity(value: &FieldValue) -> Option<u8> {
    let v = value.as_number()?;
    if v.fract() != 0.0 || v < 1.0 || v > 8.0 {
        return None;
    }
    Some(v as u8)
}

/// Outcome of a ratio rule evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioOutcome {
    pub state: TestState,
    pub bounds: Option<Bounds>,
    pub observed: Option<f64>,
    pub maturity: Option<u8>,
}

impl RatioOutcome {
    fn pending() -> Self {
        Self {
            state: TestState::Pending,
            bounds: None,
            observed: None,
            maturity: None,
        }
    }
}

/// Evaluates a ratio rule against raw inputs.
///
/// Missing or non-numeric inputs leave the test pending; an explicitly
/// unknown (`-99`) measurement passes.
pub fn evaluate_ratio(
    rule: RatioRule,
    independent: &FieldValue,
    dependent: &FieldValue,
    maturity: &FieldValue,
) -> RatioOutcome {
    let inputs = [independent, dependent];
    let needs_maturity = rule == RatioRule::GonadSomaticMaturity;

    if inputs.iter().any(|v| !v.is_present()) || (needs_maturity && !maturity.is_present()) {
        return RatioOutcome::pending();
    }
    if inputs.iter().any(|v| matches!(v, FieldValue::Invalid(_))) {
        return RatioOutcome::pending();
    }
    if inputs.iter().any(|v| matches!(v, FieldValue::Unknown)) {
        return RatioOutcome {
            state: TestState::Pass,
            ..RatioOutcome::pending()
        };
    }

    let (Some(x), Some(y)) = (independent.as_number(), dependent.as_number()) else {
        return RatioOutcome::pending();
    };
    let stage = if needs_maturity {
        match parse_maturity(maturity) {
            Some(stage) => Some(stage),
            None => return RatioOutcome::pending(),
        }
    } else {
        None
    };
    let Some(bounds) = rule.bounds(x, stage) else {
        return RatioOutcome::pending();
    };

    RatioOutcome {
        state: TestState::from_bool(bounds.contains(y)),
        bounds: Some(bounds),
        observed: Some(y),
        maturity: stage,
    }
}

// ============================================================================
// Mandatory and External Checks
// ============================================================================

/// Fails on the first empty or `"None"` value; binary, never pending
pub fn evaluate_mandatory<S: AsRef<str>>(values: &[S]) -> TestState {
    let missing = values.iter().any(|v| {
        let v = v.as_ref();
        v.is_empty() || v == "None"
    });
    TestState::from_bool(!missing)
}

/// Length-frequency observations must add up to the fish measured
pub fn evaluate_length_frequency(length_frequency_sum: i64, total_fish_measured: i64) -> TestState {
    TestState::from_bool(length_frequency_sum == total_fish_measured)
}

/// Maps an externally computed flag onto pass/fail
pub fn evaluate_flag(flag: bool) -> TestState {
    TestState::from_bool(flag)
}

// ============================================================================
// Tests
// ============================================================================
