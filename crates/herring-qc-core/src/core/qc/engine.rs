//! QC Engine
//!
//! Evaluates the test catalog against a sample through the [`QcModel`]
//! collaborator. Per-sample state that outlives a single check (pending
//! confirmations) lives in an [`EvaluationContext`] owned by the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::{ProcessingStage, RollupRole, TestCatalog, TestDefinition, TestKind};
use super::feedback::PendingConfirmation;
use super::model::{MandatorySource, QcModel};
use super::ranges::RangeTable;
use super::rollup::{evaluate_rollup, RollupBreakdown, RollupInput};
use super::rules::{
    evaluate_data_point, evaluate_flag, evaluate_length_frequency, evaluate_mandatory,
    evaluate_ratio, probable_confirmation, DataPointOutcome, RatioOutcome,
};
use crate::core::settings::QcSettings;
use crate::core::{
    Acceptance, FieldValue, MeasuredField, QcError, QcResult, SampleRef, SampleType, TestId,
    TestState, MATURITY_FIELD,
};

// ============================================================================
// Evaluation Context
// ============================================================================

/// Per-sample evaluation state owned by the caller
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    sample: SampleRef,
    pending: BTreeMap<TestId, PendingConfirmation>,
}

impl EvaluationContext {
    /// Creates a context with nothing pending
    pub fn new(sample: SampleRef) -> Self {
        Self {
            sample,
            pending: BTreeMap::new(),
        }
    }

    /// Sample under evaluation
    pub fn sample(&self) -> &SampleRef {
        &self.sample
    }

    /// Pending confirmations in test id order
    pub fn pending(&self) -> impl Iterator<Item = &PendingConfirmation> {
        self.pending.values()
    }

    /// Lowest-numbered pending confirmation
    pub fn next_pending(&self) -> Option<&PendingConfirmation> {
        self.pending.values().next()
    }

    /// Whether a confirmation is outstanding for a test
    pub fn is_pending(&self, test_id: TestId) -> bool {
        self.pending.contains_key(&test_id)
    }

    pub(crate) fn take_pending(&mut self, test_id: TestId) -> Option<PendingConfirmation> {
        self.pending.remove(&test_id)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Snapshot of every applicable test after an evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcReport {
    /// Sample that was checked
    pub sample: SampleRef,
    /// Timestamp of the check
    pub checked_at: chrono::DateTime<chrono::Utc>,
    /// Duration of the check in milliseconds
    pub duration_ms: u64,
    /// State of every applicable test
    pub results: BTreeMap<TestId, TestState>,
    /// Recorded decisions for overridable tests
    pub acceptance: BTreeMap<TestId, Acceptance>,
    /// Improbable observations awaiting a decision, in test id order
    pub pending_confirmations: Vec<PendingConfirmation>,
    /// Overall QC verdict
    pub overall: TestState,
}

impl QcReport {
    /// Evaluation is suspended on at least one confirmation
    pub fn needs_confirmation(&self) -> bool {
        !self.pending_confirmations.is_empty()
    }

    /// Test ids in a given state
    pub fn tests_in(&self, state: TestState) -> Vec<TestId> {
        self.results
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| *id)
            .collect()
    }

    /// State of a single test
    pub fn state(&self, test_id: TestId) -> Option<TestState> {
        self.results.get(&test_id).copied()
    }

    /// Generates a summary string
    pub fn summary(&self) -> String {
        format!(
            "QC Report {}: {} ({} passed, {} failed, {} pending, {} awaiting confirmation)",
            self.sample,
            self.overall,
            self.tests_in(TestState::Pass).len(),
            self.tests_in(TestState::Fail).len(),
            self.tests_in(TestState::Pending).len(),
            self.pending_confirmations.len()
        )
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Quality-control rule engine
#[derive(Debug, Clone)]
pub struct QcEngine {
    catalog: TestCatalog,
    ranges: RangeTable,
    settings: QcSettings,
}

impl Default for QcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QcEngine {
    /// Creates an engine with the built-in catalog and ranges
    pub fn new() -> Self {
        Self {
            catalog: TestCatalog::current(),
            ranges: RangeTable::default(),
            settings: QcSettings::default(),
        }
    }

    /// Creates an engine from settings, validating the catalog and ranges
    pub fn with_settings(settings: QcSettings) -> QcResult<Self> {
        let catalog = settings.catalog.catalog();
        catalog.validate()?;
        let ranges = settings.range_table();
        ranges.validate()?;
        Ok(Self {
            catalog,
            ranges,
            settings,
        })
    }

    pub fn catalog(&self) -> &TestCatalog {
        &self.catalog
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }

    pub fn settings(&self) -> &QcSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Individual checks
    // ------------------------------------------------------------------------

    /// Presence, possible-range and (when catalogued) probable-range tests of a field
    pub fn check_data_point<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        field_name: &str,
    ) -> QcResult<DataPointOutcome> {
        let field: MeasuredField = field_name.parse()?;
        let sample_type = ctx.sample.sample_type;
        let tests = self
            .catalog
            .field_tests(field, sample_type)
            .ok_or_else(|| QcError::FieldNotTested {
                field: field_name.to_string(),
                sample_type,
            })?;
        let range = self.ranges.get(field)?;

        let raw = model.field_value(&ctx.sample, field.as_str());
        let value = FieldValue::parse(raw.as_deref());
        if let FieldValue::Invalid(text) = &value {
            warn!(
                "Non-numeric value {:?} for {} on {}",
                text, field, ctx.sample
            );
        }

        let outcome = evaluate_data_point(&value, range, self.settings.non_numeric);
        self.write_state(ctx, model, tests.presence, outcome.presence);
        self.write_state(ctx, model, tests.possible, outcome.possible);

        if let Some(probable_id) = tests.probable {
            self.write_state(ctx, model, probable_id, outcome.probable);
            let confirmation = value
                .as_number()
                .map(|v| probable_confirmation(probable_id, field, &range.probable, v));
            self.record_overridable(ctx, model, probable_id, outcome.probable, confirmation);
        }
        Ok(outcome)
    }

    /// Cross-field ratio plausibility test
    pub fn check_ratio<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        test_id: TestId,
    ) -> QcResult<RatioOutcome> {
        let def = self.catalog.get_for(test_id, ctx.sample.sample_type)?;
        let TestKind::Ratio { rule } = def.kind else {
            return Err(QcError::WrongTestKind {
                test_id,
                expected: "ratio",
            });
        };

        let read = |name: &str| FieldValue::parse(model.field_value(&ctx.sample, name).as_deref());
        let independent = read(rule.independent().as_str());
        let dependent = read(rule.dependent().as_str());
        let maturity = read(MATURITY_FIELD);

        let outcome = evaluate_ratio(rule, &independent, &dependent, &maturity);
        self.write_state(ctx, model, test_id, outcome.state);

        let confirmation = match (outcome.bounds, outcome.observed) {
            (Some(bounds), Some(observed)) => {
                Some(rule.confirmation(test_id, bounds, observed, outcome.maturity))
            }
            _ => None,
        };
        self.record_overridable(ctx, model, test_id, outcome.state, confirmation);
        Ok(outcome)
    }

    /// Rollup over the test's dependency set
    pub fn check_rollup<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        test_id: TestId,
    ) -> QcResult<RollupBreakdown> {
        let def = self.catalog.get_for(test_id, ctx.sample.sample_type)?;
        let TestKind::Rollup { depends_on, .. } = &def.kind else {
            return Err(QcError::WrongTestKind {
                test_id,
                expected: "rollup",
            });
        };

        let inputs: Vec<RollupInput> = depends_on
            .iter()
            .map(|dep| {
                RollupInput::new(
                    *dep,
                    model.test_state(&ctx.sample, *dep),
                    self.overriding_acceptance(ctx, model, *dep),
                )
            })
            .collect();

        let breakdown = evaluate_rollup(&inputs);
        if let Some(blocking) = breakdown.blocking {
            debug!("Rollup {} blocked by test {}", test_id, blocking);
        }
        self.write_state(ctx, model, test_id, breakdown.state);
        Ok(breakdown)
    }

    /// Mandatory-fields test of the sample type
    pub fn check_mandatory_fields<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
    ) -> QcResult<TestState> {
        let sample_type = ctx.sample.sample_type;
        let test_id = self.find_test(sample_type, "mandatory-fields", |k| {
            matches!(k, TestKind::MandatoryFields)
        })?;
        let source = MandatorySource::for_sample_type(sample_type);
        let values = model.mandatory_values(&ctx.sample, source);
        let state = evaluate_mandatory(&values);
        self.write_state(ctx, model, test_id, state);
        Ok(state)
    }

    /// Length-frequency sum test of the sample type
    pub fn check_length_frequency<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        length_frequency_sum: i64,
        total_fish_measured: i64,
    ) -> QcResult<TestState> {
        let test_id = self.find_test(ctx.sample.sample_type, "length-frequency", |k| {
            matches!(k, TestKind::LengthFrequencySum)
        })?;
        let state = evaluate_length_frequency(length_frequency_sum, total_fish_measured);
        self.write_state(ctx, model, test_id, state);
        Ok(state)
    }

    /// Processing-complete test for a stage
    pub fn check_processing_complete<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        stage: ProcessingStage,
        complete: bool,
    ) -> QcResult<TestState> {
        let test_id = self.find_test(ctx.sample.sample_type, "processing-complete", |k| {
            matches!(k, TestKind::ProcessingComplete { stage: s } if *s == stage)
        })?;
        let state = evaluate_flag(complete);
        self.write_state(ctx, model, test_id, state);
        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    /// Recomputes the tests reading a field, then their rollups.
    ///
    /// Fields no test reads are treated as descriptive and re-run the
    /// mandatory-fields test. Returns the recomputed test ids in order.
    pub fn on_field_changed<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        field_name: &str,
    ) -> QcResult<Vec<TestId>> {
        let sample_type = ctx.sample.sample_type;
        let readers: Vec<&TestDefinition> =
            self.catalog.tests_reading(field_name, sample_type).collect();

        let mut changed = Vec::new();
        if readers.is_empty() {
            if field_name.parse::<MeasuredField>().is_ok() {
                return Err(QcError::FieldNotTested {
                    field: field_name.to_string(),
                    sample_type,
                });
            }
            if let Some(test_id) = self.optional_test(sample_type, |k| {
                matches!(k, TestKind::MandatoryFields)
            }) {
                self.check_mandatory_fields(ctx, model)?;
                changed.push(test_id);
            }
        } else {
            let mut data_point_done = false;
            for def in readers {
                match def.kind {
                    TestKind::Presence { .. }
                    | TestKind::PossibleRange { .. }
                    | TestKind::ProbableRange { .. } => {
                        if !data_point_done {
                            self.check_data_point(ctx, model, field_name)?;
                            data_point_done = true;
                        }
                        changed.push(def.id);
                    }
                    TestKind::Ratio { .. } => {
                        self.check_ratio(ctx, model, def.id)?;
                        changed.push(def.id);
                    }
                    _ => {}
                }
            }
        }

        for rollup_id in self.catalog.dependent_rollups(&changed, sample_type)? {
            self.check_rollup(ctx, model, rollup_id)?;
            changed.push(rollup_id);
        }
        debug!(
            "Field {} changed on {}: recomputed {:?}",
            field_name, ctx.sample, changed
        );
        Ok(changed)
    }

    /// Recomputes every applicable test, rollups last
    pub fn run_all<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
    ) -> QcResult<QcReport> {
        let start_time = Instant::now();
        let sample_type = ctx.sample.sample_type;
        let mut fields_done = BTreeSet::new();

        for def in self.catalog.tests_for(sample_type) {
            match def.kind {
                TestKind::Presence { field }
                | TestKind::PossibleRange { field }
                | TestKind::ProbableRange { field } => {
                    if fields_done.insert(field) {
                        self.check_data_point(ctx, model, field.as_str())?;
                    }
                }
                TestKind::Ratio { .. } => {
                    self.check_ratio(ctx, model, def.id)?;
                }
                TestKind::MandatoryFields => {
                    self.check_mandatory_fields(ctx, model)?;
                }
                TestKind::LengthFrequencySum => {
                    if let Some((sum, total)) = model.length_frequency(&ctx.sample) {
                        self.check_length_frequency(ctx, model, sum, total)?;
                    }
                }
                TestKind::ProcessingComplete { stage } => {
                    if let Some(flag) = model.processing_complete(&ctx.sample, stage) {
                        self.check_processing_complete(ctx, model, stage, flag)?;
                    }
                }
                TestKind::Rollup { .. } => {}
            }
        }

        for rollup_id in self.catalog.rollup_order(sample_type)? {
            self.check_rollup(ctx, model, rollup_id)?;
        }

        let mut report = self.report(ctx, model)?;
        report.duration_ms = start_time.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Builds a report from the current model state without re-evaluating
    pub fn report<M: QcModel + ?Sized>(
        &self,
        ctx: &EvaluationContext,
        model: &M,
    ) -> QcResult<QcReport> {
        let sample_type = ctx.sample.sample_type;
        let mut results = BTreeMap::new();
        let mut acceptance = BTreeMap::new();
        for def in self.catalog.tests_for(sample_type) {
            results.insert(def.id, model.test_state(&ctx.sample, def.id));
            if def.kind.is_acceptable() {
                let value = model.acceptance(&ctx.sample, def.id);
                if value != Acceptance::Unset {
                    acceptance.insert(def.id, value);
                }
            }
        }

        let overall = match self.optional_test(sample_type, |k| {
            matches!(
                k,
                TestKind::Rollup {
                    role: RollupRole::OverallQc,
                    ..
                }
            )
        }) {
            Some(id) => results.get(&id).copied().unwrap_or_default(),
            None => {
                // Sample types without an overall rollup summarise every test
                let inputs: Vec<RollupInput> = results
                    .iter()
                    .map(|(id, state)| {
                        RollupInput::new(*id, *state, self.overriding_acceptance(ctx, model, *id))
                    })
                    .collect();
                evaluate_rollup(&inputs).state
            }
        };

        Ok(QcReport {
            sample: ctx.sample.clone(),
            checked_at: chrono::Utc::now(),
            duration_ms: 0,
            results,
            acceptance,
            pending_confirmations: ctx.pending().cloned().collect(),
            overall,
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn write_state<M: QcModel + ?Sized>(
        &self,
        ctx: &EvaluationContext,
        model: &mut M,
        test_id: TestId,
        state: TestState,
    ) {
        let previous = model.test_state(&ctx.sample, test_id);
        if previous != state {
            debug!("Test {} on {}: {} -> {}", test_id, ctx.sample, previous, state);
        }
        model.set_test_state(&ctx.sample, test_id, state);
    }

    /// Acceptance bookkeeping shared by ratio and probable-range tests
    fn record_overridable<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
        test_id: TestId,
        state: TestState,
        confirmation: Option<PendingConfirmation>,
    ) {
        match state {
            TestState::Pass | TestState::Pending => {
                ctx.pending.remove(&test_id);
                if model.acceptance(&ctx.sample, test_id) != Acceptance::Unset {
                    debug!("Clearing acceptance of test {} on {}", test_id, ctx.sample);
                    model.set_acceptance(&ctx.sample, test_id, Acceptance::Unset);
                }
            }
            TestState::Fail => {
                if model.acceptance(&ctx.sample, test_id).is_accepted() {
                    ctx.pending.remove(&test_id);
                } else if let Some(confirmation) = confirmation {
                    ctx.pending.insert(test_id, confirmation);
                }
            }
        }
    }

    /// Recorded acceptance, ignored for tests whose failure cannot be overridden
    fn overriding_acceptance<M: QcModel + ?Sized>(
        &self,
        ctx: &EvaluationContext,
        model: &M,
        test_id: TestId,
    ) -> Acceptance {
        match self.catalog.get(test_id) {
            Ok(def) if def.kind.is_acceptable() => model.acceptance(&ctx.sample, test_id),
            _ => Acceptance::Unset,
        }
    }

    fn optional_test(
        &self,
        sample_type: SampleType,
        predicate: impl Fn(&TestKind) -> bool,
    ) -> Option<TestId> {
        self.catalog
            .tests_for(sample_type)
            .find(|t| predicate(&t.kind))
            .map(|t| t.id)
    }

    fn find_test(
        &self,
        sample_type: SampleType,
        kind: &'static str,
        predicate: impl Fn(&TestKind) -> bool,
    ) -> QcResult<TestId> {
        self.optional_test(sample_type, predicate)
            .ok_or(QcError::NoTestOfKind { kind, sample_type })
    }
}

// ============================================================================
// Tests
// ============================================================================
