//! End-to-End Scenario Tests
//!
//! Drive the engine through whole samples and check the behaviour the forms
//! rely on: sentinel handling, inclusive bounds, rollup cascades, acceptance
//! and idempotence.

use crate::core::qc::{
    EvaluationContext, QcEngine, QcModel, RangeTable, RatioRule, SampleRecord,
};
use crate::core::{Acceptance, MeasuredField, SampleRef, SampleType, TestId, TestState};

fn context(sample_type: SampleType) -> EvaluationContext {
    EvaluationContext::new(SampleRef::new(sample_type, "scenario"))
}

/// Sample type and presence/possible ids that test each field
fn field_cases() -> [(MeasuredField, SampleType, TestId, TestId); 4] {
    [
        (MeasuredField::FishLength, SampleType::LabSample, 300, 301),
        (MeasuredField::FishWeight, SampleType::LabSample, 303, 304),
        (MeasuredField::GonadWeight, SampleType::LabSample, 306, 307),
        (MeasuredField::AnnulusCount, SampleType::OtolithSample, 309, 310),
    ]
}

fn check_field(field: MeasuredField, sample_type: SampleType, raw: &str) -> SampleRecord {
    let engine = QcEngine::new();
    let mut record = SampleRecord::new().with_field(field.as_str(), raw);
    engine
        .check_data_point(&mut context(sample_type), &mut record, field.as_str())
        .unwrap();
    record
}

// ============================================================================
// Data Points
// ============================================================================

#[test]
fn test_scenario_sentinel_passes_every_field() {
    for (field, sample_type, presence, possible) in field_cases() {
        let record = check_field(field, sample_type, "-99");
        assert_eq!(record.results[&presence], TestState::Pass, "{field}");
        assert_eq!(record.results[&possible], TestState::Pass, "{field}");
    }
}

#[test]
fn test_scenario_empty_value_fails_presence_only() {
    for (field, sample_type, presence, possible) in field_cases() {
        let record = check_field(field, sample_type, "");
        assert_eq!(record.results[&presence], TestState::Fail, "{field}");
        assert_eq!(record.results[&possible], TestState::Pending, "{field}");
    }
}

#[test]
fn test_scenario_possible_bounds_are_inclusive() {
    let ranges = RangeTable::default();
    for (field, sample_type, _, possible) in field_cases() {
        let interval = &ranges.get(field).unwrap().possible;
        for bound in [interval.min, interval.max] {
            let record = check_field(field, sample_type, &bound.to_string());
            assert_eq!(record.results[&possible], TestState::Pass, "{field} at {bound}");
        }
        let above = check_field(field, sample_type, &(interval.max + 0.1).to_string());
        assert_eq!(above.results[&possible], TestState::Fail, "{field} above max");
    }
}

// ============================================================================
// Ratio Bounds
// ============================================================================

#[test]
fn test_scenario_length_weight_bounds() {
    let bounds = RatioRule::LengthWeight.bounds(300.0, None).unwrap();
    let expected_min = (-12.978f64 + 3.18 * 300f64.ln()).exp();
    let expected_max = (-12.505f64 + 3.18 * 300f64.ln()).exp();
    assert!((bounds.min - expected_min).abs() / expected_min < 1e-6);
    assert!((bounds.max - expected_max).abs() / expected_max < 1e-6);

    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("fish_weight", "1");
    engine.check_ratio(&mut ctx, &mut record, 204).unwrap();
    assert_eq!(record.results[&204], TestState::Fail);

    record.set_field("fish_weight", Some(&bounds.midpoint().to_string()));
    engine.check_ratio(&mut ctx, &mut record, 204).unwrap();
    assert_eq!(record.results[&204], TestState::Pass);
}

// ============================================================================
// Rollups
// ============================================================================

#[test]
fn test_scenario_rollup_states_through_engine() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);

    // 304 absent
    let mut record = SampleRecord::new();
    record.results.insert(301, TestState::Pass);
    record.results.insert(307, TestState::Pending);
    engine.check_rollup(&mut ctx, &mut record, 203).unwrap();
    assert_eq!(record.results[&203], TestState::Pending);

    let mut record = SampleRecord::new();
    record.results.insert(204, TestState::Fail);
    record.results.insert(207, TestState::Pass);
    engine.check_rollup(&mut ctx, &mut record, 208).unwrap();
    assert_eq!(record.results[&208], TestState::Fail);

    record.set_acceptance(ctx.sample(), 204, Acceptance::Accepted);
    engine.check_rollup(&mut ctx, &mut record, 208).unwrap();
    assert_eq!(record.results[&208], TestState::Pass);

    record.results.insert(207, TestState::Pending);
    engine.check_rollup(&mut ctx, &mut record, 208).unwrap();
    assert_eq!(record.results[&208], TestState::Pending);
}

#[test]
fn test_scenario_accepting_ratio_flips_improbable_rollup() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("fish_weight", "100")
        .with_field("gonad_weight", "0.5")
        .with_field("maturity", "1")
        .with_mandatory(["F", "4"]);

    let report = engine.run_all(&mut ctx, &mut record).unwrap();
    assert_eq!(report.state(204), Some(TestState::Fail));
    assert_eq!(report.state(207), Some(TestState::Pass));
    assert_eq!(report.state(208), Some(TestState::Fail));
    assert_eq!(report.overall, TestState::Fail);
    assert_eq!(report.pending_confirmations[0].test_id, 204);

    record.set_acceptance(ctx.sample(), 204, Acceptance::Accepted);
    engine.check_rollup(&mut ctx, &mut record, 208).unwrap();
    assert_eq!(record.results[&208], TestState::Pass);
    assert_eq!(record.results[&204], TestState::Fail);

    let report = engine.run_all(&mut ctx, &mut record).unwrap();
    assert_eq!(report.overall, TestState::Pass);
    assert!(!report.needs_confirmation());
    assert_eq!(report.acceptance[&204], Acceptance::Accepted);
}

#[test]
fn test_scenario_mandatory_gap_in_any_position() {
    let engine = QcEngine::new();
    for gap in 0..3 {
        for blank in ["", "None"] {
            let mut values = vec!["F", "4", "Net"];
            values[gap] = blank;
            let mut record = SampleRecord::new().with_mandatory(values);
            let state = engine
                .check_mandatory_fields(&mut context(SampleType::LabSample), &mut record)
                .unwrap();
            assert_eq!(state, TestState::Fail, "gap {gap} {blank:?}");
        }
    }

    let mut record = SampleRecord::new().with_mandatory(["F", "4", "Net"]);
    let state = engine
        .check_mandatory_fields(&mut context(SampleType::SeaSample), &mut record)
        .unwrap();
    assert_eq!(state, TestState::Pass);
}

// ============================================================================
// Whole Samples
// ============================================================================

#[test]
fn test_scenario_underweight_fish_fails_overall() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("fish_weight", "0.5")
        .with_mandatory(["F"]);

    let report = engine.run_all(&mut ctx, &mut record).unwrap();

    assert_eq!(report.state(300), Some(TestState::Pass));
    assert_eq!(report.state(301), Some(TestState::Pass));
    assert_eq!(report.state(303), Some(TestState::Pass));
    assert_eq!(report.state(304), Some(TestState::Fail));
    assert_eq!(report.state(203), Some(TestState::Fail));
    assert_eq!(report.state(201), Some(TestState::Fail));
    assert_eq!(report.overall, TestState::Fail);
}

#[test]
fn test_scenario_stray_acceptance_cannot_override_possible_range() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("fish_weight", "0.5")
        .with_field("gonad_weight", "0")
        .with_field("maturity", "1")
        .with_mandatory(["F"])
        .with_acceptance(304, Acceptance::Accepted)
        .with_acceptance(204, Acceptance::Accepted);

    let report = engine.run_all(&mut ctx, &mut record).unwrap();

    assert_eq!(report.state(304), Some(TestState::Fail));
    assert_eq!(report.state(208), Some(TestState::Pass));
    assert_eq!(report.state(203), Some(TestState::Fail));
    assert_eq!(report.state(201), Some(TestState::Fail));
    assert_eq!(report.overall, TestState::Fail);
    assert!(!report.acceptance.contains_key(&304));
}

#[test]
fn test_scenario_rerun_is_idempotent() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::LabSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("fish_weight", "100")
        .with_field("gonad_weight", "-99")
        .with_field("maturity", "3")
        .with_mandatory(["F", "3"])
        .with_acceptance(204, Acceptance::Rejected);

    let first = engine.run_all(&mut ctx, &mut record).unwrap();
    let snapshot = record.clone();
    let second = engine.run_all(&mut ctx, &mut record).unwrap();

    assert_eq!(record, snapshot);
    assert_eq!(first.results, second.results);
    assert_eq!(first.acceptance, second.acceptance);
    let ids = |r: &crate::core::qc::QcReport| -> Vec<TestId> {
        r.pending_confirmations.iter().map(|p| p.test_id).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_scenario_editing_a_field_cascades_to_overall() {
    let engine = QcEngine::new();
    let mut ctx = context(SampleType::OtolithSample);
    let mut record = SampleRecord::new()
        .with_field("fish_length", "300")
        .with_field("annulus_count", "6")
        .with_mandatory(["Reader"]);
    engine.run_all(&mut ctx, &mut record).unwrap();
    assert_eq!(record.test_state(ctx.sample(), 200), TestState::Pass);

    record.set_field("annulus_count", Some("25"));
    let changed = engine
        .on_field_changed(&mut ctx, &mut record, "annulus_count")
        .unwrap();

    assert_eq!(changed, vec![209, 309, 310, 210, 211, 200]);
    assert_eq!(record.results[&310], TestState::Fail);
    assert_eq!(record.results[&209], TestState::Fail);
    assert_eq!(record.results[&200], TestState::Fail);
    assert!(ctx.is_pending(209));
}
