//! Terminal prompters for the confirmation workflow.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use herring_qc_lib::core::qc::{Announcement, ConfirmationPrompt, PromptReply, Prompter};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

/// Asks on stdout and reads answers line by line from stdin.
///
/// End of input closes the prompt for good.
pub struct StdinPrompter {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> PromptReply {
        if prompt.attempt == 1 {
            println!("\n[test {}] {}", prompt.test_id, prompt.message);
        }
        print!("[y/n] > ");
        let _ = std::io::Write::flush(&mut std::io::stdout());

        match self.lines.lock().await.next_line().await {
            Ok(Some(line)) => PromptReply::Answer(line),
            Ok(None) => PromptReply::Closed,
            Err(err) => {
                warn!("Failed to read answer from stdin: {}", err);
                PromptReply::Closed
            }
        }
    }

    async fn announce(&self, announcement: Announcement) {
        log_announcement(&announcement);
    }
}

/// Answers from a fixed list, then reports the input closed
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> PromptReply {
        let next = match self.answers.lock() {
            Ok(mut answers) => answers.pop_front(),
            Err(_) => None,
        };
        match next {
            Some(answer) => {
                info!("Test {}: scripted answer {:?}", prompt.test_id, answer);
                PromptReply::Answer(answer)
            }
            None => {
                info!("Test {}: no scripted answer left", prompt.test_id);
                PromptReply::Closed
            }
        }
    }

    async fn announce(&self, announcement: Announcement) {
        log_announcement(&announcement);
    }
}

fn log_announcement(announcement: &Announcement) {
    match announcement {
        Announcement::Improbable(message) => info!("{}", message),
        Announcement::RedoMeasurement => info!("Please redo the measurement"),
        Announcement::Accepted => info!("Measurement accepted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ConfirmationPrompt {
        ConfirmationPrompt {
            test_id: 204,
            message_lite: "short".to_string(),
            message: "long".to_string(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_scripted_prompter_replays_then_closes() {
        let prompter = ScriptedPrompter::new(vec!["y".to_string(), " N".to_string()]);
        assert_eq!(
            prompter.ask(&prompt()).await,
            PromptReply::Answer("y".to_string())
        );
        assert_eq!(
            prompter.ask(&prompt()).await,
            PromptReply::Answer(" N".to_string())
        );
        assert_eq!(prompter.ask(&prompt()).await, PromptReply::Closed);
        assert_eq!(prompter.ask(&prompt()).await, PromptReply::Closed);
    }
}
