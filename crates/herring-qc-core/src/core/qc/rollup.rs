//! QC Rollups
//!
//! A rollup test summarises the states of a fixed dependency set. Failed
//! dependencies only block the rollup while they lack an accepted decision.

use crate::core::{Acceptance, TestId, TestState};

/// Current state of one rollup dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupInput {
    pub test_id: TestId,
    pub state: TestState,
    pub acceptance: Acceptance,
}

impl RollupInput {
    pub fn new(test_id: TestId, state: TestState, acceptance: Acceptance) -> Self {
        Self {
            test_id,
            state,
            acceptance,
        }
    }
}

/// Dependency ids bucketed by state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupBreakdown {
    pub passed: Vec<TestId>,
    pub failed: Vec<TestId>,
    pub pending: Vec<TestId>,
    /// First failed dependency without an accepted decision
    pub blocking: Option<TestId>,
    pub state: TestState,
}

/// Evaluates a rollup over its dependencies
pub fn evaluate_rollup(inputs: &[RollupInput]) -> RollupBreakdown {
    let mut breakdown = RollupBreakdown::default();
    for input in inputs {
        match input.state {
            TestState::Pass => breakdown.passed.push(input.test_id),
            TestState::Fail => breakdown.failed.push(input.test_id),
            TestState::Pending => breakdown.pending.push(input.test_id),
        }
    }

    breakdown.state = if breakdown.pending.len() == inputs.len() {
        TestState::Pending
    } else if breakdown.failed.is_empty() && breakdown.pending.is_empty() {
        TestState::Pass
    } else if breakdown.failed.is_empty() {
        // standby until the remaining dependencies are evaluable
        TestState::Pending
    } else {
        breakdown.blocking = inputs
            .iter()
            .find(|i| i.state == TestState::Fail && !i.acceptance.is_accepted())
            .map(|i| i.test_id);
        match (breakdown.blocking, breakdown.pending.is_empty()) {
            (Some(_), _) => TestState::Fail,
            (None, false) => TestState::Pending,
            (None, true) => TestState::Pass,
        }
    };
    breakdown
}

// ============================================================================
// Tests
// ============================================================================
