//! Quality Control (QC) System
//!
//! Numbered quality-control tests for herring lab and otolith samples.
//! Provides the test catalog, range table, pure rule evaluations, the engine
//! and the confirmation workflow for improbable observations.

pub mod catalog;
pub mod confirmation;
pub mod engine;
pub mod feedback;
pub mod model;
pub mod ranges;
pub mod rollup;
pub mod rules;

// Re-export main types
pub use catalog::{FieldTests, ProcessingStage, RollupRole, TestCatalog, TestDefinition, TestKind};
pub use confirmation::{
    AbandonPolicy, Announcement, ConfirmationPrompt, ConfirmationWorkflow, PromptReply, Prompter,
    WorkflowOutcome,
};
pub use engine::{EvaluationContext, QcEngine, QcReport};
pub use feedback::{format_bound, round_half_up, Bounds, PendingConfirmation};
pub use model::{MandatorySource, QcModel, SampleRecord};
pub use ranges::{Interval, RangeDefinition, RangeTable};
pub use rollup::{evaluate_rollup, RollupBreakdown, RollupInput};
pub use rules::{DataPointOutcome, NonNumericPolicy, RatioOutcome, RatioRule};
