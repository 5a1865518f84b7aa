// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal confirmation for gated workflow tasks.

use async_trait::async_trait;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use opsdesk_core::application::confirmation::{AutoApprove, AutoDecline, ConfirmationGate, ConfirmationPrompt};
use opsdesk_core::domain::policy::RiskLevel;

/// Blocking question put to the operator.
pub type Asker = fn(&ConfirmationPrompt) -> Result<bool, String>;

fn ask_terminal(_prompt: &ConfirmationPrompt) -> Result<bool, String> {
    dialoguer::Confirm::new()
        .with_prompt("Confirm execution?")
        .default(false)
        .interact()
        .map_err(|e| e.to_string())
}

/// Asks on the terminal. Concurrent tasks queue for the prompt.
///
/// No answer within `timeout`, queueing included, is a decline. The question
/// runs on a detached thread so an unanswered prompt never holds up process
/// exit; a late answer is discarded.
pub struct InteractiveConfirmation {
    terminal: Arc<Mutex<()>>,
    timeout: Duration,
    asker: Asker,
}

impl InteractiveConfirmation {
    pub fn new(timeout: Duration) -> Self {
        Self::with_asker(timeout, ask_terminal)
    }

    pub fn with_asker(timeout: Duration, asker: Asker) -> Self {
        Self {
            terminal: Arc::new(Mutex::new(())),
            timeout,
            asker,
        }
    }
}

#[async_trait]
impl ConfirmationGate for InteractiveConfirmation {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        let terminal = Arc::clone(&self.terminal);
        let asker = self.asker;
        let prompt = prompt.clone();
        let ask = async move {
            let guard = terminal.lock_owned().await;

            let risk = match prompt.risk_level {
                RiskLevel::Low => prompt.risk_level.as_str().green(),
                RiskLevel::Medium => prompt.risk_level.as_str().yellow(),
                RiskLevel::High | RiskLevel::Critical => prompt.risk_level.as_str().red().bold(),
            };
            println!();
            println!("{} {}", "⚠ Confirmation required:".yellow().bold(), prompt.task_id);
            println!("  Task: {}", prompt.description);
            println!("  Intent: {}", prompt.intent);
            println!("  Handler: {}", prompt.handler.as_deref().unwrap_or("none"));
            println!("  Risk: {}", risk);

            let (tx, rx) = oneshot::channel();
            std::thread::Builder::new()
                .name("opsdesk-confirm".to_string())
                .spawn(move || {
                    let _terminal = guard;
                    let _ = tx.send(asker(&prompt));
                })
                .map_err(|e| e.to_string())?;
            let answer = rx.await.map_err(|_| "prompt thread exited without an answer".to_string())?;
            Ok::<bool, String>(answer?)
        };

        match tokio::time::timeout(self.timeout, ask).await {
            Ok(Ok(approved)) => approved,
            Ok(Err(e)) => {
                warn!("Confirmation prompt failed, treating as declined: {}", e);
                false
            }
            Err(_) => {
                println!();
                println!("{}", "No answer in time, declined.".yellow());
                warn!(timeout_secs = self.timeout.as_secs(), "Confirmation timed out, treating as declined");
                false
            }
        }
    }
}

/// Gate chosen by the `--yes` / `--no` flags.
pub fn from_flags(yes: bool, no: bool, timeout: Duration) -> Arc<dyn ConfirmationGate> {
    if yes {
        Arc::new(AutoApprove)
    } else if no {
        Arc::new(AutoDecline)
    } else {
        Arc::new(InteractiveConfirmation::new(timeout))
    }
}
