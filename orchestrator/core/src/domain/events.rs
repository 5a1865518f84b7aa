// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::ErrorCode;
use crate::domain::workflow::{SkipReason, TaskId, WorkflowId, WorkflowStatus};

/// Lifecycle of a workflow run, published by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        name: String,
        task_count: usize,
        started_at: DateTime<Utc>,
    },
    TaskStarted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        intent: String,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        handler: Option<String>,
        latency_ms: Option<u64>,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        workflow_id: WorkflowId,
        task_id: TaskId,
        code: ErrorCode,
        message: String,
        failed_at: DateTime<Utc>,
    },
    TaskSkipped {
        workflow_id: WorkflowId,
        task_id: TaskId,
        reason: SkipReason,
        skipped_at: DateTime<Utc>,
    },
    WorkflowFinished {
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        completed: usize,
        failed: usize,
        skipped: usize,
        finished_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn workflow_id(&self) -> &WorkflowId {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::TaskStarted { workflow_id, .. }
            | Self::TaskCompleted { workflow_id, .. }
            | Self::TaskFailed { workflow_id, .. }
            | Self::TaskSkipped { workflow_id, .. }
            | Self::WorkflowFinished { workflow_id, .. } => workflow_id,
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskSkipped { task_id, .. } => Some(task_id),
            Self::WorkflowStarted { .. } | Self::WorkflowFinished { .. } => None,
        }
    }
}
