use std::fmt::Write as _;

use anyhow::{Context, Result};
use herring_qc_lib::core::qc::{
    ConfirmationWorkflow, EvaluationContext, Prompter, QcEngine, QcReport, WorkflowOutcome,
};
use herring_qc_lib::core::{TestId, TestState};
use serde::Serialize;
use tracing::info;

use crate::cli::CheckArgs;
use crate::prompt::{ScriptedPrompter, StdinPrompter};
use crate::sample::SampleFile;

#[derive(Serialize)]
struct CheckOutput<'a> {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_id: Option<TestId>,
    report: &'a QcReport,
}

/// Runs the confirmation workflow over a loaded sample
pub async fn execute<P: Prompter + ?Sized>(
    engine: &QcEngine,
    sample: &mut SampleFile,
    prompter: &P,
) -> Result<WorkflowOutcome> {
    let mut ctx = EvaluationContext::new(sample.sample_ref());
    let outcome = ConfirmationWorkflow::new(engine, prompter)
        .resolve(&mut ctx, &mut sample.record)
        .await
        .with_context(|| format!("failed to evaluate {}", ctx.sample()))?;
    Ok(outcome)
}

pub fn render_table(engine: &QcEngine, outcome: &WorkflowOutcome) -> String {
    let report = outcome.report();
    let mut out = String::new();
    for (id, state) in &report.results {
        let description = engine
            .catalog()
            .get(*id)
            .map(|d| d.description.as_str())
            .unwrap_or_default();
        let accepted = report
            .acceptance
            .get(id)
            .map(|a| a.display_text())
            .unwrap_or_default();
        let _ = writeln!(out, "{id:>4}  {:<7} {accepted:<3}  {description}", state.to_string());
    }
    for pending in &report.pending_confirmations {
        let _ = writeln!(out, "awaiting confirmation: {}", pending.message_lite);
    }
    match outcome {
        WorkflowOutcome::Completed(_) => {}
        WorkflowOutcome::Rejected { test_id, .. } => {
            let _ = writeln!(out, "test {test_id} not confirmed: redo the measurement");
        }
        WorkflowOutcome::Cancelled { test_id, .. } => {
            let _ = writeln!(out, "confirmation of test {test_id} cancelled");
        }
    }
    let _ = writeln!(out, "{}", report.summary());
    out
}

fn render_json(outcome: &WorkflowOutcome) -> Result<String> {
    let (label, test_id) = match outcome {
        WorkflowOutcome::Completed(_) => ("completed", None),
        WorkflowOutcome::Rejected { test_id, .. } => ("rejected", Some(*test_id)),
        WorkflowOutcome::Cancelled { test_id, .. } => ("cancelled", Some(*test_id)),
    };
    let output = CheckOutput {
        outcome: label,
        test_id,
        report: outcome.report(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

pub async fn run(args: CheckArgs, engine: &QcEngine) -> Result<TestState> {
    let mut sample = SampleFile::load(&args.sample)?;

    let outcome = match args.answers {
        Some(answers) => execute(engine, &mut sample, &ScriptedPrompter::new(answers)).await?,
        None => execute(engine, &mut sample, &StdinPrompter::new()).await?,
    };

    if args.json {
        println!("{}", render_json(&outcome)?);
    } else {
        print!("{}", render_table(engine, &outcome));
    }

    if args.write_back {
        sample.save(&args.sample)?;
        info!("Results written to {}", args.sample.display());
    }
    Ok(outcome.report().overall)
}
