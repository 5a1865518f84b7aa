// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Confirmation gate for risk-bearing workflow tasks.
//!
//! The coordinator asks the gate once per confirmation-required task and
//! suspends that task until an answer arrives. `false` skips the task
//! without it ever reaching a handler.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::domain::policy::RiskLevel;
use crate::domain::workflow::{TaskId, WorkflowId};

/// What the approver is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub task_id: TaskId,
    pub description: String,
    pub intent: String,
    pub risk_level: RiskLevel,
    pub principal_id: String,
    /// Handler the intent is bound to, `None` when nothing serves it.
    #[serde(default)]
    pub handler: Option<String>,
}

impl ConfirmationPrompt {
    pub fn text(&self) -> String {
        format!(
            "Task: {}\nIntent: {}\nHandler: {}\nRisk: {}\nConfirm execution? (yes/no)",
            self.description,
            self.intent,
            self.handler.as_deref().unwrap_or("none"),
            self.risk_level
        )
    }
}

#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool;
}

/// Approves everything. Non-interactive runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, _prompt: &ConfirmationPrompt) -> bool {
        true
    }
}

/// Declines everything. Dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

#[async_trait]
impl ConfirmationGate for AutoDecline {
    async fn confirm(&self, _prompt: &ConfirmationPrompt) -> bool {
        false
    }
}

type PromptFn = dyn Fn(ConfirmationPrompt) -> BoxFuture<'static, bool> + Send + Sync;

/// Adapts an async closure into a gate.
pub struct FnConfirmation {
    f: Box<PromptFn>,
}

impl FnConfirmation {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ConfirmationPrompt) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        Self {
            f: Box::new(move |prompt| Box::pin(f(prompt))),
        }
    }

    /// Closure that only sees the rendered prompt text.
    pub fn from_text<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        Self::new(move |prompt: ConfirmationPrompt| f(prompt.text()))
    }
}

#[async_trait]
impl ConfirmationGate for FnConfirmation {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        (self.f)(prompt.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(task: &str) -> ConfirmationPrompt {
        ConfirmationPrompt {
            workflow_id: WorkflowId::from_string("wf-1"),
            workflow_name: "Password Reset & Verification".to_string(),
            task_id: TaskId::from(task),
            description: "Reset password for jdoe".to_string(),
            intent: "ad.password.reset".to_string(),
            risk_level: RiskLevel::Medium,
            principal_id: "tech1".to_string(),
            handler: Some("directory".to_string()),
        }
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            prompt("reset_password").text(),
            "Task: Reset password for jdoe\nIntent: ad.password.reset\nHandler: directory\nRisk: medium\nConfirm execution? (yes/no)"
        );
    }

    #[tokio::test]
    async fn test_fixed_gates() {
        assert!(AutoApprove.confirm(&prompt("a")).await);
        assert!(!AutoDecline.confirm(&prompt("a")).await);
    }

    #[tokio::test]
    async fn test_fn_confirmation_sees_prompt() {
        let gate = FnConfirmation::new(|p: ConfirmationPrompt| async move { p.task_id.as_str() != "reset_password" });
        assert!(gate.confirm(&prompt("check_user")).await);
        assert!(!gate.confirm(&prompt("reset_password")).await);
    }

    #[tokio::test]
    async fn test_text_closure() {
        let gate = FnConfirmation::from_text(|text| async move { text.contains("Risk: low") });
        assert!(!gate.confirm(&prompt("reset_password")).await);
    }
}
