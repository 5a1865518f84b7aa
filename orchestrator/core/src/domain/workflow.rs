// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! A workflow is a multi-step IT procedure expressed as a dependency graph of
//! tasks, each targeting one intent. Definitions are immutable: run state
//! (status, result, error) lives with the coordinator, never on the graph.
//!
//! # Architectural Context
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** Workflow
//! - **Consumed by:** `application::workflow_coordinator`
//!
//! # Invariants
//!
//! - Task ids are unique within a workflow
//! - Dependencies reference only task ids of the same workflow
//! - The dependency graph is acyclic
//!
//! [`WorkflowValidator`] enforces all three before anything executes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::policy::RiskLevel;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Identifier of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(format!("wf-{}", Uuid::new_v4().simple()))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task identifier, unique within its workflow (e.g. `check_user`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Intent routed through the intent router.
    pub intent: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, intent: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            intent: intent.into(),
            description: description.into(),
            parameters: Map::new(),
            dependencies: Vec::new(),
            risk_level: RiskLevel::Low,
            requires_confirmation: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}

/// Workflow Aggregate Root
///
/// Tasks keep their declaration order; reports follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<Task>,
    /// External ticket the run is attached to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_number: Option<String>,
    pub created_by: String,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            description: description.into(),
            tasks: Vec::new(),
            ticket_number: None,
            created_by: created_by.into(),
        }
    }

    pub fn with_id(mut self, id: WorkflowId) -> Self {
        self.id = id;
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_ticket(mut self, ticket_number: impl Into<String>) -> Self {
        self.ticket_number = Some(ticket_number.into());
        self
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Declaration index of every task, keyed by id.
    pub fn index(&self) -> HashMap<&TaskId, usize> {
        self.tasks.iter().enumerate().map(|(i, t)| (&t.id, i)).collect()
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        WorkflowValidator::validate(self)
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Why a task never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The confirmation gate declined the task.
    Declined,
    /// A dependency ended failed or skipped.
    DependencyUnmet {
        dependency: TaskId,
        dependency_status: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined => f.write_str("declined"),
            Self::DependencyUnmet {
                dependency,
                dependency_status,
            } => write!(f, "dependency '{}' {}", dependency, dependency_status),
        }
    }
}

/// Per-task state machine.
///
/// `Pending -> InProgress -> {Completed | Failed}` or `Pending -> Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped(SkipReason),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped(_) => "skipped",
        }
    }

    /// Single-glyph marker used by the text report.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::InProgress => "⏳",
            Self::Completed => "✓",
            Self::Failed => "✗",
            Self::Skipped(_) => "⊘",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

impl WorkflowStatus {
    /// `completed` when every task completed, `failed` when none did.
    pub fn from_counts(completed: usize, total: usize) -> Self {
        if total > 0 && completed == total {
            Self::Completed
        } else if completed > 0 {
            Self::PartiallyCompleted
        } else {
            Self::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Workflow '{0}' must have at least one task")]
    NoTasks(String),

    #[error("Task id cannot be empty")]
    EmptyTaskId,

    #[error("Task '{0}' has no intent")]
    EmptyIntent(TaskId),

    #[error("Duplicate task id '{0}'")]
    DuplicateTaskId(TaskId),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Task '{0}' depends on itself")]
    SelfDependency(TaskId),

    #[error("Dependency cycle detected: {}", .0.iter().map(TaskId::as_str).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<TaskId>),
}

// ============================================================================
// Domain Services
// ============================================================================

/// Structural validation of a workflow graph.
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Ids, dependency references, then cycles.
    pub fn validate(workflow: &Workflow) -> Result<(), WorkflowError> {
        if workflow.tasks.is_empty() {
            return Err(WorkflowError::NoTasks(workflow.name.clone()));
        }

        let mut seen = HashSet::new();
        for task in &workflow.tasks {
            if task.id.as_str().trim().is_empty() {
                return Err(WorkflowError::EmptyTaskId);
            }
            if task.intent.trim().is_empty() {
                return Err(WorkflowError::EmptyIntent(task.id.clone()));
            }
            if !seen.insert(&task.id) {
                return Err(WorkflowError::DuplicateTaskId(task.id.clone()));
            }
        }

        for task in &workflow.tasks {
            for dependency in &task.dependencies {
                if dependency == &task.id {
                    return Err(WorkflowError::SelfDependency(task.id.clone()));
                }
                if !seen.contains(dependency) {
                    return Err(WorkflowError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Self::check_for_cycles(workflow)
    }

    /// DFS over dependency edges; reports the first cycle found in
    /// declaration order as the path that closes it.
    pub fn check_for_cycles(workflow: &Workflow) -> Result<(), WorkflowError> {
        fn visit<'a>(
            current: &'a TaskId,
            edges: &HashMap<&'a TaskId, &'a [TaskId]>,
            visited: &mut HashSet<&'a TaskId>,
            stack: &mut Vec<&'a TaskId>,
        ) -> Option<Vec<TaskId>> {
            visited.insert(current);
            stack.push(current);

            for next in edges.get(current).copied().unwrap_or_default() {
                if let Some(pos) = stack.iter().position(|s| *s == next) {
                    let mut cycle: Vec<TaskId> = stack[pos..].iter().map(|t| (*t).clone()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                if !visited.contains(next) {
                    if let Some(cycle) = visit(next, edges, visited, stack) {
                        return Some(cycle);
                    }
                }
            }

            stack.pop();
            None
        }

        let edges: HashMap<&TaskId, &[TaskId]> = workflow
            .tasks
            .iter()
            .map(|t| (&t.id, t.dependencies.as_slice()))
            .collect();

        let mut visited = HashSet::new();
        for task in &workflow.tasks {
            if visited.contains(&task.id) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = visit(&task.id, &edges, &mut visited, &mut stack) {
                return Err(WorkflowError::Cycle(cycle));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Workflow {
        Workflow::new("chain", "a then b then c", "tech1")
            .with_task(Task::new("a", "ad.user.lookup", "A"))
            .with_task(Task::new("b", "ad.password.reset", "B").depends_on("a"))
            .with_task(Task::new("c", "graph.signin.list", "C").depends_on("b"))
    }

    #[test]
    fn test_workflow_id_creation() {
        let id1 = WorkflowId::new();
        let id2 = WorkflowId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("wf-"));
    }

    #[test]
    fn test_valid_chain_passes() {
        assert!(chain().validate().is_ok());
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let wf = Workflow::new("empty", "", "tech1");
        assert_eq!(wf.validate(), Err(WorkflowError::NoTasks("empty".to_string())));
    }

    #[test]
    fn test_duplicate_task_id_rejected() {
        let wf = chain().with_task(Task::new("a", "ad.user.lookup", "again"));
        assert_eq!(wf.validate(), Err(WorkflowError::DuplicateTaskId(TaskId::from("a"))));
    }

    #[test]
    fn test_unknown_and_self_dependencies_rejected() {
        let unknown = chain().with_task(Task::new("d", "x.y", "D").depends_on("ghost"));
        assert_eq!(
            unknown.validate(),
            Err(WorkflowError::UnknownDependency {
                task: TaskId::from("d"),
                dependency: TaskId::from("ghost"),
            })
        );

        let selfish = chain().with_task(Task::new("d", "x.y", "D").depends_on("d"));
        assert_eq!(selfish.validate(), Err(WorkflowError::SelfDependency(TaskId::from("d"))));
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let wf = Workflow::new("loop", "", "tech1")
            .with_task(Task::new("a", "x.a", "A").depends_on("c"))
            .with_task(Task::new("b", "x.b", "B").depends_on("a"))
            .with_task(Task::new("c", "x.c", "C").depends_on("b"));

        match wf.validate() {
            Err(WorkflowError::Cycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let wf = Workflow::new("diamond", "", "tech1")
            .with_task(Task::new("root", "x.a", "root"))
            .with_task(Task::new("left", "x.b", "left").depends_on("root"))
            .with_task(Task::new("right", "x.c", "right").depends_on("root"))
            .with_task(Task::new("join", "x.d", "join").depends_on("left").depends_on("right"));
        assert!(WorkflowValidator::check_for_cycles(&wf).is_ok());
    }

    #[test]
    fn test_workflow_status_from_counts() {
        assert_eq!(WorkflowStatus::from_counts(3, 3), WorkflowStatus::Completed);
        assert_eq!(WorkflowStatus::from_counts(1, 3), WorkflowStatus::PartiallyCompleted);
        assert_eq!(WorkflowStatus::from_counts(0, 3), WorkflowStatus::Failed);
    }

    #[test]
    fn test_task_status_serde_shape() {
        let status = TaskStatus::Skipped(SkipReason::DependencyUnmet {
            dependency: TaskId::from("a"),
            dependency_status: "failed".to_string(),
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"]["kind"], "dependency_unmet");
        assert_eq!(status.to_string(), "skipped");
        assert!(status.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }
}
