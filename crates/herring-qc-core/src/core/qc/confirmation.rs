//! Confirmation Workflow
//!
//! Suspend/resume driver for improbable observations. Evaluation runs until a
//! failed overridable test lacks an accepted decision; the driver then asks the
//! [`Prompter`] about the lowest-numbered one, records the answer and resumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::engine::{EvaluationContext, QcEngine, QcReport};
use super::feedback::PendingConfirmation;
use super::model::QcModel;
use crate::core::{Acceptance, QcResult, TestId};

/// What happens when a prompt is dismissed without a yes/no answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbandonPolicy {
    /// Stop the workflow and leave the acceptance untouched
    #[default]
    Cancel,
    /// Ask again until answered
    Reprompt,
}

/// A question put to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub test_id: TestId,
    /// Short form for voice read-back
    pub message_lite: String,
    /// Full question text
    pub message: String,
    /// 1 for the first ask, incremented on every re-ask
    pub attempt: u32,
}

impl ConfirmationPrompt {
    fn from_pending(pending: &PendingConfirmation) -> Self {
        Self {
            test_id: pending.test_id,
            message_lite: pending.message_lite.clone(),
            message: pending.message.clone(),
            attempt: 1,
        }
    }
}

/// Raw reply from the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Answer(String),
    /// Prompt closed without an answer
    Dismissed,
    /// No further replies can arrive
    Closed,
}

/// Audio/visual cue around a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// Read the short message before asking
    Improbable(String),
    /// The user answered no
    RedoMeasurement,
    /// The user answered yes
    Accepted,
}

/// Confirmation collaborator
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Asks the question and returns the raw reply
    async fn ask(&self, prompt: &ConfirmationPrompt) -> PromptReply;

    /// Plays a cue; silent unless overridden
    async fn announce(&self, _announcement: Announcement) {}
}

/// How a workflow run ended
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// Nothing left to confirm
    Completed(QcReport),
    /// The user declined to confirm a measurement
    Rejected { test_id: TestId, report: QcReport },
    /// The prompt was dismissed or the input ended
    Cancelled { test_id: TestId, report: QcReport },
}

impl WorkflowOutcome {
    pub fn report(&self) -> &QcReport {
        match self {
            WorkflowOutcome::Completed(report)
            | WorkflowOutcome::Rejected { report, .. }
            | WorkflowOutcome::Cancelled { report, .. } => report,
        }
    }

    pub fn into_report(self) -> QcReport {
        match self {
            WorkflowOutcome::Completed(report)
            | WorkflowOutcome::Rejected { report, .. }
            | WorkflowOutcome::Cancelled { report, .. } => report,
        }
    }
}

enum Decision {
    Yes,
    No,
    Abandoned,
}

/// Drives evaluation and prompting until nothing is pending or the user stops
pub struct ConfirmationWorkflow<'a, P: Prompter + ?Sized> {
    engine: &'a QcEngine,
    prompter: &'a P,
}

impl<'a, P: Prompter + ?Sized> ConfirmationWorkflow<'a, P> {
    pub fn new(engine: &'a QcEngine, prompter: &'a P) -> Self {
        Self { engine, prompter }
    }

    /// Runs every check and resolves pending confirmations one at a time.
    ///
    /// The exclusive borrows of `ctx` and `model` keep other evaluations out
    /// while a prompt is open.
    pub async fn resolve<M: QcModel + ?Sized>(
        &self,
        ctx: &mut EvaluationContext,
        model: &mut M,
    ) -> QcResult<WorkflowOutcome> {
        let settings = &self.engine.settings().confirmation;
        let mut report = self.engine.run_all(ctx, model)?;

        while let Some(pending) = ctx.next_pending().cloned() {
            let test_id = pending.test_id;
            debug!("Confirming test {} on {}", test_id, ctx.sample());

            if settings.talk_back {
                self.prompter
                    .announce(Announcement::Improbable(pending.message_lite.clone()))
                    .await;
            }
            tokio::time::sleep(settings.settle_delay()).await;

            match self.ask_until_answered(&pending).await {
                Decision::Yes => {
                    info!("Test {} accepted on {}", test_id, ctx.sample());
                    model.set_acceptance(ctx.sample(), test_id, Acceptance::Accepted);
                    ctx.take_pending(test_id);
                    if settings.talk_back {
                        self.prompter.announce(Announcement::Accepted).await;
                    }
                    report = self.engine.run_all(ctx, model)?;
                }
                Decision::No => {
                    info!("Test {} rejected on {}", test_id, ctx.sample());
                    model.set_acceptance(ctx.sample(), test_id, Acceptance::Rejected);
                    if settings.talk_back {
                        self.prompter.announce(Announcement::RedoMeasurement).await;
                    }
                    let report = self.engine.report(ctx, model)?;
                    return Ok(WorkflowOutcome::Rejected { test_id, report });
                }
                Decision::Abandoned => {
                    info!("Confirmation of test {} cancelled on {}", test_id, ctx.sample());
                    let report = self.engine.report(ctx, model)?;
                    return Ok(WorkflowOutcome::Cancelled { test_id, report });
                }
            }
        }

        Ok(WorkflowOutcome::Completed(report))
    }

    async fn ask_until_answered(&self, pending: &PendingConfirmation) -> Decision {
        let policy = self.engine.settings().confirmation.on_abandon;
        let mut prompt = ConfirmationPrompt::from_pending(pending);
        loop {
            match self.prompter.ask(&prompt).await {
                PromptReply::Answer(answer) => match answer.trim().to_ascii_lowercase().as_str() {
                    "y" => return Decision::Yes,
                    "n" => return Decision::No,
                    other => debug!("Ignoring reply {:?} to test {}", other, prompt.test_id),
                },
                PromptReply::Dismissed => {
                    if policy == AbandonPolicy::Cancel {
                        return Decision::Abandoned;
                    }
                }
                PromptReply::Closed => {
                    debug!("Input closed while confirming test {}", prompt.test_id);
                    return Decision::Abandoned;
                }
            }
            prompt.attempt = prompt.attempt.saturating_add(1);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::core::qc::model::SampleRecord;
    use crate::core::settings::QcSettings;
    use crate::core::{SampleRef, SampleType, TestState};

    /// Replies from a script, then reports the input closed
    struct ScriptedPrompter {
        replies: Mutex<VecDeque<PromptReply>>,
        asked: Mutex<Vec<ConfirmationPrompt>>,
        announced: Mutex<Vec<Announcement>>,
    }

    impl ScriptedPrompter {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|r| PromptReply::Answer(r.to_string()))
                        .collect(),
                ),
                asked: Mutex::new(Vec::new()),
                announced: Mutex::new(Vec::new()),
            }
        }

        fn asked_ids(&self) -> Vec<TestId> {
            self.asked.lock().unwrap().iter().map(|p| p.test_id).collect()
        }
    }

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn ask(&self, prompt: &ConfirmationPrompt) -> PromptReply {
            self.asked.lock().unwrap().push(prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PromptReply::Closed)
        }

        async fn announce(&self, announcement: Announcement) {
            self.announced.lock().unwrap().push(announcement);
        }
    }

    fn engine() -> QcEngine {
        let mut settings = QcSettings::default();
        settings.confirmation.settle_delay_ms = 0;
        QcEngine::with_settings(settings).unwrap()
    }

    fn lab() -> EvaluationContext {
        EvaluationContext::new(SampleRef::new(SampleType::LabSample, "fd-1"))
    }

    /// Both ratio tests out of bounds, everything else valid
    fn improbable_record() -> SampleRecord {
        SampleRecord::new()
            .with_field("fish_length", "300")
            .with_field("fish_weight", "100")
            .with_field("gonad_weight", "80")
            .with_field("maturity", "1")
            .with_mandatory(["F", "4"])
    }

    // ========================================================================
    // Workflow Tests
    // ========================================================================

    #[tokio::test]
    async fn test_nothing_pending_completes_without_prompting() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&[]);
        let mut record = SampleRecord::new()
            .with_field("fish_length", "300")
            .with_field("fish_weight", "200")
            .with_mandatory(["F"]);

        let outcome = ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        assert!(matches!(outcome, WorkflowOutcome::Completed(_)));
        assert!(prompter.asked_ids().is_empty());
    }

    #[tokio::test]
    async fn test_accepting_both_prompts_in_test_order() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&["y", "Y "]);
        let mut record = improbable_record();

        let outcome = ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        assert_eq!(prompter.asked_ids(), vec![204, 207]);
        let report = outcome.report();
        assert!(!report.needs_confirmation());
        assert_eq!(report.state(204), Some(TestState::Fail));
        assert_eq!(report.state(207), Some(TestState::Fail));
        assert_eq!(report.state(208), Some(TestState::Pass));
        assert_eq!(report.overall, TestState::Pass);
        assert_eq!(record.acceptance[&204], Acceptance::Accepted);
        assert_eq!(record.acceptance[&207], Acceptance::Accepted);
    }

    #[tokio::test]
    async fn test_invalid_replies_are_reasked() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&["maybe", "", "yes", "y", "y"]);
        let mut record = improbable_record();

        ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        let asked = prompter.asked.lock().unwrap();
        assert_eq!(asked.len(), 5);
        assert_eq!(asked[3].test_id, 204);
        assert_eq!(asked[3].attempt, 4);
        assert_eq!(asked[4].test_id, 207);
        assert_eq!(asked[4].attempt, 1);
    }

    #[tokio::test]
    async fn test_rejection_stops_the_workflow() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&["n"]);
        let mut record = improbable_record();

        let outcome = ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        let WorkflowOutcome::Rejected { test_id, report } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(test_id, 204);
        assert_eq!(report.state(208), Some(TestState::Fail));
        assert_eq!(record.acceptance[&204], Acceptance::Rejected);
        assert_eq!(prompter.asked_ids(), vec![204]);
        assert!(prompter
            .announced
            .lock()
            .unwrap()
            .contains(&Announcement::RedoMeasurement));
    }

    #[tokio::test]
    async fn test_dismissal_cancels_by_default() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&[]);
        prompter
            .replies
            .lock()
            .unwrap()
            .push_back(PromptReply::Dismissed);
        let mut record = improbable_record();

        let outcome = ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WorkflowOutcome::Cancelled { test_id: 204, .. }
        ));
        assert!(outcome.report().needs_confirmation());
        assert!(record.acceptance.is_empty());
    }

    #[tokio::test]
    async fn test_dismissal_reprompts_with_legacy_policy() {
        let mut settings = QcSettings::default();
        settings.confirmation.settle_delay_ms = 0;
        settings.confirmation.on_abandon = AbandonPolicy::Reprompt;
        let engine = QcEngine::with_settings(settings).unwrap();

        let prompter = ScriptedPrompter::new(&[]);
        {
            let mut replies = prompter.replies.lock().unwrap();
            replies.push_back(PromptReply::Dismissed);
            replies.push_back(PromptReply::Dismissed);
            replies.push_back(PromptReply::Answer("y".to_string()));
            replies.push_back(PromptReply::Answer("y".to_string()));
        }
        let mut record = improbable_record();

        let outcome = ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        assert!(matches!(outcome, WorkflowOutcome::Completed(_)));
        assert_eq!(prompter.asked_ids(), vec![204, 204, 204, 207]);
    }

    #[tokio::test]
    async fn test_closed_input_ends_reprompting() {
        let mut settings = QcSettings::default();
        settings.confirmation.settle_delay_ms = 0;
        settings.confirmation.on_abandon = AbandonPolicy::Reprompt;
        let engine = QcEngine::with_settings(settings).unwrap();

        let prompter = ScriptedPrompter::new(&["maybe"]);
        prompter
            .replies
            .lock()
            .unwrap()
            .push_back(PromptReply::Dismissed);
        let mut record = improbable_record();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            ConfirmationWorkflow::new(&engine, &prompter).resolve(&mut lab(), &mut record),
        )
        .await
        .expect("workflow should end once input is closed")
        .unwrap();

        assert!(matches!(
            outcome,
            WorkflowOutcome::Cancelled { test_id: 204, .. }
        ));
        assert_eq!(prompter.asked_ids(), vec![204, 204, 204]);
        assert!(record.acceptance.is_empty());
    }

    #[tokio::test]
    async fn test_talk_back_announcements() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&["y", "y"]);
        let mut record = improbable_record();

        ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        let announced = prompter.announced.lock().unwrap();
        assert_eq!(announced.len(), 4);
        assert_eq!(
            announced[0],
            Announcement::Improbable(
                "Improbable measurement for fish length : fish weight ratio".to_string()
            )
        );
        assert_eq!(announced[1], Announcement::Accepted);
    }

    #[tokio::test]
    async fn test_previously_accepted_tests_are_not_reprompted() {
        let engine = engine();
        let prompter = ScriptedPrompter::new(&["y"]);
        let mut record = improbable_record().with_acceptance(204, Acceptance::Accepted);

        ConfirmationWorkflow::new(&engine, &prompter)
            .resolve(&mut lab(), &mut record)
            .await
            .unwrap();

        assert_eq!(prompter.asked_ids(), vec![207]);
    }
}
