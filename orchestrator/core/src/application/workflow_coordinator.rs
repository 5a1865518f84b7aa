// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Coordinator
//!
//! Executes a [`Workflow`] dependency graph to completion in waves:
//!
//! 1. The ready set is every pending task whose dependencies all completed.
//! 2. An empty ready set with tasks still pending aborts the run with
//!    [`CoordinatorError::Deadlock`].
//! 3. Every ready task runs concurrently; the wave ends when all of them are
//!    terminal. Confirmation-required tasks ask the [`ConfirmationGate`]
//!    first and are skipped on a decline without reaching the router.
//! 4. A task ending failed or skipped immediately skips every pending task
//!    that transitively depends on it.
//!
//! Handler calls within a run are bounded by a semaphore and each carries a
//! deadline; expiry fails the task with `TASK_TIMEOUT`.
//!
//! Each task's status cell is written only by the coordinator loop, from the
//! outcome its own execution returned.

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::application::confirmation::{ConfirmationGate, ConfirmationPrompt};
use crate::application::router::{panic_message, IntentRouter};
use crate::domain::audit::{AuditEventType, AuditOutcome, AuditRecord};
use crate::domain::config::CoordinatorConfig;
use crate::domain::events::WorkflowEvent;
use crate::domain::request::{ErrorCode, Request, RequestContext, Response, ResponseError};
use crate::domain::workflow::{
    SkipReason, Task, TaskId, TaskStatus, Workflow, WorkflowError, WorkflowId, WorkflowStatus,
};
use crate::infrastructure::audit::AuditSink;
use crate::infrastructure::event_bus::EventBus;

const RESULT_PREVIEW_CHARS: usize = 100;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),

    #[error("Workflow '{workflow_id}' deadlocked: no task can proceed ({} pending)", .pending.len())]
    Deadlock {
        workflow_id: WorkflowId,
        pending: Vec<TaskId>,
        /// State of every task when progress stopped.
        report: Box<WorkflowReport>,
    },
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidWorkflow(_) => ErrorCode::InvalidInput,
            Self::Deadlock { .. } => ErrorCode::WorkflowDeadlock,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub intent: String,
    pub description: String,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Outcome of a run, tasks in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_id: WorkflowId,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_number: Option<String>,
    pub status: WorkflowStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Non-zero only in the partial report of a deadlocked run.
    pub pending: usize,
    pub tasks: Vec<TaskReport>,
}

impl WorkflowReport {
    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id.as_str() == id)
    }

    /// Human-readable report. Contains no timings, so identical runs render
    /// identically.
    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "WORKFLOW REPORT: {}", self.name);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "ID: {}", self.workflow_id);
        let _ = writeln!(out, "Description: {}", self.description);
        if let Some(ticket) = &self.ticket_number {
            let _ = writeln!(out, "Ticket: {}", ticket);
        }
        let _ = writeln!(out, "Status: {}", self.status);
        out.push('\n');

        out.push_str("STATUS SUMMARY:\n");
        let _ = writeln!(out, "  ✓ Completed: {}/{}", self.completed, self.total);
        if self.failed > 0 {
            let _ = writeln!(out, "  ✗ Failed: {}", self.failed);
        }
        if self.skipped > 0 {
            let _ = writeln!(out, "  ⊘ Skipped: {}", self.skipped);
        }
        if self.pending > 0 {
            let _ = writeln!(out, "  ⏳ Pending: {}", self.pending);
        }
        out.push('\n');

        out.push_str("TASK DETAILS:\n");
        for (i, task) in self.tasks.iter().enumerate() {
            let _ = writeln!(out, "{}. {} {}", i + 1, task.status.icon(), task.task_id);
            let _ = writeln!(out, "   Intent: {}", task.intent);
            let _ = writeln!(out, "   Description: {}", task.description);
            let _ = writeln!(out, "   Status: {}", task.status);
            if let TaskStatus::Skipped(reason) = &task.status {
                let _ = writeln!(out, "   Reason: {}", reason);
            }
            if !task.dependencies.is_empty() {
                let deps: Vec<&str> = task.dependencies.iter().map(TaskId::as_str).collect();
                let _ = writeln!(out, "   Dependencies: {}", deps.join(", "));
            }
            if let Some(handler) = &task.handler {
                let _ = writeln!(out, "   Handler: {}", handler);
            }
            if let Some(result) = &task.result {
                let _ = writeln!(out, "   Result: {}", preview(&result.to_string()));
            }
            if let Some(error) = &task.error {
                let _ = writeln!(out, "   Error: {}", error);
            }
            out.push('\n');
        }

        out
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > RESULT_PREVIEW_CHARS {
        let cut: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

// ============================================================================
// Run State
// ============================================================================

#[derive(Debug, Clone)]
struct TaskRun {
    status: TaskStatus,
    result: Option<Value>,
    error: Option<ResponseError>,
    handler: Option<String>,
    latency_ms: Option<u64>,
}

impl TaskRun {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
            handler: None,
            latency_ms: None,
        }
    }
}

/// What one task execution hands back to the loop.
#[derive(Debug)]
enum TaskOutcome {
    Declined,
    Routed(Response),
    Failed(ResponseError),
}

/// Everything a spawned task needs, owned.
struct TaskExecution {
    task: Task,
    workflow_id: WorkflowId,
    workflow_name: String,
    base_context: RequestContext,
    router: Arc<IntentRouter>,
    confirmation: Arc<dyn ConfirmationGate>,
    audit: Option<Arc<dyn AuditSink>>,
    limiter: Arc<Semaphore>,
    task_timeout: Duration,
}

impl TaskExecution {
    async fn run(self) -> TaskOutcome {
        let mut approver = None;

        if self.task.requires_confirmation {
            let prompt = ConfirmationPrompt {
                workflow_id: self.workflow_id.clone(),
                workflow_name: self.workflow_name.clone(),
                task_id: self.task.id.clone(),
                description: self.task.description.clone(),
                intent: self.task.intent.clone(),
                risk_level: self.task.risk_level,
                principal_id: self.base_context.principal.id.clone(),
                handler: self
                    .router
                    .handler_for(&self.task.intent)
                    .map(|handler| handler.name().to_string()),
            };
            let approved = self.confirmation.confirm(&prompt).await;
            self.audit_confirmation(approved);
            if !approved {
                info!(workflow_id = %self.workflow_id, task_id = %self.task.id, "Task declined at confirmation");
                return TaskOutcome::Declined;
            }
            approver = Some(self.base_context.principal.id.clone());
        }

        let context = self
            .base_context
            .for_task(self.task.id.as_str(), self.task.risk_level, approver.as_deref());
        let request = Request::new(self.task.intent.clone(), context).with_parameters(self.task.parameters.clone());

        let Ok(_permit) = self.limiter.acquire().await else {
            return TaskOutcome::Failed(ResponseError::new(
                ErrorCode::Handler("COORDINATOR_SHUTDOWN".to_string()),
                "Concurrency limiter closed",
            ));
        };

        match tokio::time::timeout(self.task_timeout, self.router.route(request)).await {
            Ok(response) => TaskOutcome::Routed(response),
            Err(_) => TaskOutcome::Failed(
                ResponseError::new(
                    ErrorCode::TaskTimeout,
                    format!(
                        "Task '{}' did not finish within {}s",
                        self.task.id,
                        self.task_timeout.as_secs_f64()
                    ),
                )
                .with_detail("intent", self.task.intent.as_str())
                .with_detail("timeout_ms", u64::try_from(self.task_timeout.as_millis()).unwrap_or(u64::MAX)),
            ),
        }
    }

    fn audit_confirmation(&self, approved: bool) {
        let Some(audit) = &self.audit else {
            return;
        };
        let principal = self.base_context.principal.id.as_str();
        let record = if approved {
            let context = self
                .base_context
                .for_task(self.task.id.as_str(), self.task.risk_level, Some(principal));
            AuditRecord::success(AuditEventType::ApprovalGranted, &context)
        } else {
            let context = self.base_context.for_task(self.task.id.as_str(), self.task.risk_level, None);
            AuditRecord::new(AuditEventType::ApprovalDeclined, &context, AuditOutcome::Denied)
        };
        audit.record(
            record
                .with_detail("workflow_id", self.workflow_id.as_str())
                .with_detail("task_id", self.task.id.as_str())
                .with_detail("intent", self.task.intent.as_str()),
        );
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct WorkflowCoordinator {
    router: Arc<IntentRouter>,
    event_bus: Option<EventBus>,
    audit: Option<Arc<dyn AuditSink>>,
    task_timeout: Duration,
    max_concurrency: usize,
}

impl WorkflowCoordinator {
    pub fn new(router: Arc<IntentRouter>) -> Self {
        Self::from_config(router, &CoordinatorConfig::default())
    }

    pub fn from_config(router: Arc<IntentRouter>, config: &CoordinatorConfig) -> Self {
        Self {
            router,
            event_bus: None,
            audit: None,
            task_timeout: config.task_timeout,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn router(&self) -> &Arc<IntentRouter> {
        &self.router
    }

    /// Validate, then run `workflow` on behalf of `context` until every task
    /// is terminal.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        context: &RequestContext,
        confirmation: Arc<dyn ConfirmationGate>,
    ) -> Result<WorkflowReport, CoordinatorError> {
        workflow.validate()?;
        self.drive(workflow, context, confirmation).await
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        context: &RequestContext,
        confirmation: Arc<dyn ConfirmationGate>,
    ) -> Result<WorkflowReport, CoordinatorError> {
        let n = workflow.tasks.len();
        let index = workflow.index();
        let dependencies: Vec<Vec<usize>> = workflow
            .tasks
            .iter()
            .map(|t| t.dependencies.iter().filter_map(|d| index.get(d).copied()).collect())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in dependencies.iter().enumerate() {
            for &d in deps {
                dependents[d].push(i);
            }
        }

        let limiter = Arc::new(Semaphore::new(self.max_concurrency));
        let mut runs = vec![TaskRun::pending(); n];

        info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            tasks = n,
            correlation_id = %context.correlation_id,
            "Starting workflow"
        );
        self.publish(WorkflowEvent::WorkflowStarted {
            workflow_id: workflow.id.clone(),
            name: workflow.name.clone(),
            task_count: n,
            started_at: Utc::now(),
        });

        while !runs.iter().all(|r| r.status.is_terminal()) {
            let ready: Vec<usize> = (0..n)
                .filter(|&i| {
                    runs[i].status == TaskStatus::Pending
                        && dependencies[i].iter().all(|&d| runs[d].status == TaskStatus::Completed)
                })
                .collect();

            if ready.is_empty() {
                let pending: Vec<TaskId> = workflow
                    .tasks
                    .iter()
                    .zip(&runs)
                    .filter(|(_, r)| r.status == TaskStatus::Pending)
                    .map(|(t, _)| t.id.clone())
                    .collect();
                error!(
                    workflow_id = %workflow.id,
                    pending = pending.len(),
                    "Workflow deadlock detected: no pending task can proceed"
                );
                let report = build_report(workflow, &runs, Some(WorkflowStatus::Failed));
                self.publish_finished(&report);
                return Err(CoordinatorError::Deadlock {
                    workflow_id: workflow.id.clone(),
                    pending,
                    report: Box::new(report),
                });
            }

            let mut wave = JoinSet::new();
            for &i in &ready {
                let task = &workflow.tasks[i];
                runs[i].status = TaskStatus::InProgress;
                info!(workflow_id = %workflow.id, task_id = %task.id, intent = %task.intent, "Executing task");
                self.publish(WorkflowEvent::TaskStarted {
                    workflow_id: workflow.id.clone(),
                    task_id: task.id.clone(),
                    intent: task.intent.clone(),
                    started_at: Utc::now(),
                });

                let execution = TaskExecution {
                    task: task.clone(),
                    workflow_id: workflow.id.clone(),
                    workflow_name: workflow.name.clone(),
                    base_context: context.clone(),
                    router: Arc::clone(&self.router),
                    confirmation: Arc::clone(&confirmation),
                    audit: self.audit.clone(),
                    limiter: Arc::clone(&limiter),
                    task_timeout: self.task_timeout,
                };
                wave.spawn(async move {
                    let outcome = AssertUnwindSafe(execution.run())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            TaskOutcome::Failed(ResponseError::new(
                                ErrorCode::HandlerPanicked,
                                format!("Task execution panicked: {}", panic_message(payload.as_ref())),
                            ))
                        });
                    (i, outcome)
                });
            }

            while let Some(joined) = wave.join_next().await {
                match joined {
                    Ok((i, outcome)) => self.apply(workflow, &mut runs, &dependents, i, outcome),
                    Err(e) => error!(workflow_id = %workflow.id, "Task join failed: {}", e),
                }
            }

            // A join failure leaves its task in progress
            for &i in &ready {
                if runs[i].status == TaskStatus::InProgress {
                    let outcome = TaskOutcome::Failed(ResponseError::new(
                        ErrorCode::HandlerPanicked,
                        "Task execution was aborted before reporting an outcome",
                    ));
                    self.apply(workflow, &mut runs, &dependents, i, outcome);
                }
            }
        }

        let report = build_report(workflow, &runs, None);
        info!(
            workflow_id = %workflow.id,
            status = %report.status,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            total = report.total,
            "Workflow complete: {}/{} tasks succeeded",
            report.completed,
            report.total
        );
        self.publish_finished(&report);
        Ok(report)
    }

    /// Record one task's outcome and cascade skips from it.
    fn apply(
        &self,
        workflow: &Workflow,
        runs: &mut [TaskRun],
        dependents: &[Vec<usize>],
        i: usize,
        outcome: TaskOutcome,
    ) {
        let task = &workflow.tasks[i];
        let run = &mut runs[i];

        match outcome {
            TaskOutcome::Declined => {
                run.status = TaskStatus::Skipped(SkipReason::Declined);
                self.publish(WorkflowEvent::TaskSkipped {
                    workflow_id: workflow.id.clone(),
                    task_id: task.id.clone(),
                    reason: SkipReason::Declined,
                    skipped_at: Utc::now(),
                });
            }
            TaskOutcome::Routed(response) if response.success => {
                info!(workflow_id = %workflow.id, task_id = %task.id, "✓ Task completed");
                run.status = TaskStatus::Completed;
                run.result = response.data;
                run.handler = response.handler;
                run.latency_ms = response.execution_time_ms;
                self.publish(WorkflowEvent::TaskCompleted {
                    workflow_id: workflow.id.clone(),
                    task_id: task.id.clone(),
                    handler: run.handler.clone(),
                    latency_ms: run.latency_ms,
                    completed_at: Utc::now(),
                });
            }
            TaskOutcome::Routed(response) => {
                run.handler = response.handler;
                run.latency_ms = response.execution_time_ms;
                let error = response.error.unwrap_or_else(|| {
                    ResponseError::new(ErrorCode::Handler("HANDLER_ERROR".to_string()), "Handler reported failure")
                });
                self.fail(workflow, run, task, error);
            }
            TaskOutcome::Failed(error) => self.fail(workflow, run, task, error),
        }

        if matches!(runs[i].status, TaskStatus::Failed | TaskStatus::Skipped(_)) {
            self.cascade_skip(workflow, runs, dependents, i);
        }
    }

    fn fail(&self, workflow: &Workflow, run: &mut TaskRun, task: &Task, error: ResponseError) {
        warn!(
            workflow_id = %workflow.id,
            task_id = %task.id,
            code = %error.code,
            "✗ Task failed: {}",
            error.message
        );
        run.status = TaskStatus::Failed;
        self.publish(WorkflowEvent::TaskFailed {
            workflow_id: workflow.id.clone(),
            task_id: task.id.clone(),
            code: error.code.clone(),
            message: error.message.clone(),
            failed_at: Utc::now(),
        });
        run.error = Some(error);
    }

    /// Skip every pending transitive dependent of `origin`.
    fn cascade_skip(&self, workflow: &Workflow, runs: &mut [TaskRun], dependents: &[Vec<usize>], origin: usize) {
        let mut queue = VecDeque::from([origin]);
        while let Some(current) = queue.pop_front() {
            let dependency = workflow.tasks[current].id.clone();
            let dependency_status = runs[current].status.as_str().to_string();
            for &d in &dependents[current] {
                if runs[d].status != TaskStatus::Pending {
                    continue;
                }
                let reason = SkipReason::DependencyUnmet {
                    dependency: dependency.clone(),
                    dependency_status: dependency_status.clone(),
                };
                info!(
                    workflow_id = %workflow.id,
                    task_id = %workflow.tasks[d].id,
                    "Skipping task: {}",
                    reason
                );
                runs[d].status = TaskStatus::Skipped(reason.clone());
                self.publish(WorkflowEvent::TaskSkipped {
                    workflow_id: workflow.id.clone(),
                    task_id: workflow.tasks[d].id.clone(),
                    reason,
                    skipped_at: Utc::now(),
                });
                queue.push_back(d);
            }
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn publish_finished(&self, report: &WorkflowReport) {
        self.publish(WorkflowEvent::WorkflowFinished {
            workflow_id: report.workflow_id.clone(),
            status: report.status,
            completed: report.completed,
            failed: report.failed,
            skipped: report.skipped,
            finished_at: Utc::now(),
        });
    }
}

fn build_report(workflow: &Workflow, runs: &[TaskRun], status: Option<WorkflowStatus>) -> WorkflowReport {
    let count = |pred: fn(&TaskStatus) -> bool| runs.iter().filter(|r| pred(&r.status)).count();
    let completed = count(|s| matches!(s, TaskStatus::Completed));
    let failed = count(|s| matches!(s, TaskStatus::Failed));
    let skipped = count(|s| matches!(s, TaskStatus::Skipped(_)));
    let total = workflow.tasks.len();

    let tasks = workflow
        .tasks
        .iter()
        .zip(runs)
        .map(|(task, run)| TaskReport {
            task_id: task.id.clone(),
            intent: task.intent.clone(),
            description: task.description.clone(),
            dependencies: task.dependencies.clone(),
            status: run.status.clone(),
            result: run.result.clone(),
            error: run.error.clone(),
            handler: run.handler.clone(),
            latency_ms: run.latency_ms,
        })
        .collect();

    WorkflowReport {
        workflow_id: workflow.id.clone(),
        name: workflow.name.clone(),
        description: workflow.description.clone(),
        ticket_number: workflow.ticket_number.clone(),
        status: status.unwrap_or_else(|| WorkflowStatus::from_counts(completed, total)),
        total,
        completed,
        failed,
        skipped,
        pending: total - completed - failed - skipped,
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::confirmation::{AutoApprove, AutoDecline, FnConfirmation};
    use crate::domain::handler::Handler;
    use crate::domain::policy::{Principal, RiskLevel};
    use crate::domain::request::RequestSource;
    use crate::infrastructure::audit::InMemoryAuditSink;
    use async_trait::async_trait;
    use serde_json::json;

    /// Succeeds unless the request carries `fail: true`.
    struct Scripted;

    #[async_trait]
    impl Handler for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supported_intents(&self) -> Vec<String> {
            vec!["test.op".to_string()]
        }

        async fn handle(&self, request: Request) -> Response {
            if request.parameters.get("fail") == Some(&json!(true)) {
                return Response::failure(ResponseError::new("REMOTE_DOWN", "backend unavailable"));
            }
            Response::ok(json!({
                "correlation_id": request.context.correlation_id,
                "approved": request.context.approval_granted,
                "approver": request.context.approver_id,
            }))
        }
    }

    fn coordinator() -> WorkflowCoordinator {
        let router = IntentRouter::from_handlers([Arc::new(Scripted) as Arc<dyn Handler>]).unwrap();
        WorkflowCoordinator::new(Arc::new(router))
    }

    fn context() -> RequestContext {
        RequestContext::new(Principal::new("tech1", ["it_helpdesk"]), RequestSource::Cli, RiskLevel::Low)
            .with_correlation_id("base")
    }

    fn op(id: &str) -> Task {
        Task::new(id, "test.op", format!("step {}", id))
    }

    #[tokio::test]
    async fn test_failure_cascades_transitively() {
        let wf = Workflow::new("cascade", "", "tech1")
            .with_task(op("a").with_param("fail", true))
            .with_task(op("b").depends_on("a"))
            .with_task(op("c").depends_on("b"))
            .with_task(op("d"));

        let report = coordinator().execute(&wf, &context(), Arc::new(AutoApprove)).await.unwrap();

        assert_eq!(report.task("a").unwrap().status, TaskStatus::Failed);
        assert_eq!(
            report.task("b").unwrap().status,
            TaskStatus::Skipped(SkipReason::DependencyUnmet {
                dependency: TaskId::from("a"),
                dependency_status: "failed".to_string(),
            })
        );
        assert_eq!(
            report.task("c").unwrap().status,
            TaskStatus::Skipped(SkipReason::DependencyUnmet {
                dependency: TaskId::from("b"),
                dependency_status: "skipped".to_string(),
            })
        );
        assert_eq!(report.task("d").unwrap().status, TaskStatus::Completed);
        assert_eq!(report.status, WorkflowStatus::PartiallyCompleted);
        assert_eq!((report.completed, report.failed, report.skipped), (1, 1, 2));

        let error = report.task("a").unwrap().error.as_ref().unwrap();
        assert_eq!(error.code, ErrorCode::Handler("REMOTE_DOWN".to_string()));
    }

    #[tokio::test]
    async fn test_task_context_derived_from_base() {
        let wf = Workflow::new("ctx", "", "tech1")
            .with_task(op("plain"))
            .with_task(op("gated").requiring_confirmation().with_risk(RiskLevel::Medium));

        let report = coordinator().execute(&wf, &context(), Arc::new(AutoApprove)).await.unwrap();

        let plain = report.task("plain").unwrap().result.as_ref().unwrap();
        assert_eq!(plain["correlation_id"], "base/plain");
        assert_eq!(plain["approved"], false);

        let gated = report.task("gated").unwrap().result.as_ref().unwrap();
        assert_eq!(gated["correlation_id"], "base/gated");
        assert_eq!(gated["approved"], true);
        assert_eq!(gated["approver"], "tech1");
    }

    #[tokio::test]
    async fn test_all_declined_is_failed_and_audited() {
        let sink = InMemoryAuditSink::new();
        let coordinator = coordinator().with_audit_sink(Arc::new(sink.clone()));
        let wf = Workflow::new("declined", "", "tech1").with_task(op("only").requiring_confirmation());

        let report = coordinator.execute(&wf, &context(), Arc::new(AutoDecline)).await.unwrap();

        assert_eq!(report.status, WorkflowStatus::Failed);
        assert_eq!(report.task("only").unwrap().status, TaskStatus::Skipped(SkipReason::Declined));
        assert!(report.task("only").unwrap().handler.is_none());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, AuditEventType::ApprovalDeclined);
        assert_eq!(records[0].details["task_id"], "only");
    }

    #[tokio::test]
    async fn test_prompt_names_the_bound_handler() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let gate = FnConfirmation::new(move |prompt: ConfirmationPrompt| {
            recorder.lock().push((prompt.task_id.clone(), prompt.handler.clone(), prompt.text()));
            async { false }
        });
        let wf = Workflow::new("prompts", "", "tech1")
            .with_task(op("bound").requiring_confirmation())
            .with_task(Task::new("unbound", "nothing.serves.this", "orphan").requiring_confirmation());

        coordinator().execute(&wf, &context(), Arc::new(gate)).await.unwrap();

        let mut seen = seen.lock().clone();
        seen.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        assert_eq!(seen[0].1.as_deref(), Some("scripted"));
        assert!(seen[0].2.contains("Handler: scripted"));
        assert_eq!(seen[1].1, None);
        assert!(seen[1].2.contains("Handler: none"));
    }

    #[tokio::test]
    async fn test_unvalidated_cycle_hits_deadlock_backstop() {
        let wf = Workflow::new("loop", "", "tech1")
            .with_task(op("free"))
            .with_task(op("x").depends_on("y"))
            .with_task(op("y").depends_on("x"));

        let err = coordinator().drive(&wf, &context(), Arc::new(AutoApprove)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WorkflowDeadlock);
        match err {
            CoordinatorError::Deadlock { pending, report, .. } => {
                assert_eq!(pending, vec![TaskId::from("x"), TaskId::from("y")]);
                assert_eq!(report.status, WorkflowStatus::Failed);
                assert_eq!(report.completed, 1);
                assert_eq!(report.pending, 2);
                assert!(report.render().contains("⏳ Pending: 2"));
            }
            other => panic!("expected deadlock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_runs_first() {
        let wf = Workflow::new("loop", "", "tech1")
            .with_task(op("x").depends_on("y"))
            .with_task(op("y").depends_on("x"));
        let err = coordinator().execute(&wf, &context(), Arc::new(AutoApprove)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidWorkflow(WorkflowError::Cycle(_))));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), RESULT_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
