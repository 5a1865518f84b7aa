// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Confirmation Service - pending-request approval gate
//!
//! Each confirmation becomes a pending request that another task (chat bot,
//! web UI, operator console) lists and answers by id. Silence past the
//! timeout, or cancellation, counts as a decline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::confirmation::{ConfirmationGate, ConfirmationPrompt};

/// How a confirmation request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Approved {
        approved_by: Option<String>,
        approved_at: DateTime<Utc>,
    },
    Declined {
        reason: String,
        declined_by: Option<String>,
        declined_at: DateTime<Utc>,
    },
    TimedOut {
        timeout_at: DateTime<Utc>,
    },
    Cancelled {
        cancelled_at: DateTime<Utc>,
    },
}

impl ConfirmationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("Confirmation request {0} not found or already answered")]
    NotFound(Uuid),

    #[error("Confirmation request {0} was abandoned by its requester")]
    Abandoned(Uuid),
}

#[derive(Debug)]
struct PendingRequest {
    prompt: ConfirmationPrompt,
    created_at: DateTime<Utc>,
    timeout: Duration,
    response_tx: oneshot::Sender<ConfirmationOutcome>,
}

/// Information about a pending request (for display)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub prompt: ConfirmationPrompt,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

pub struct ConfirmationService {
    pending: Arc<RwLock<HashMap<Uuid, PendingRequest>>>,
    timeout: Duration,
}

/// Removes the pending entry when `request` returns or its future is dropped.
struct PendingGuard<'a> {
    pending: &'a RwLock<HashMap<Uuid, PendingRequest>>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.write().remove(&self.id).is_some() {
            debug!(request_id = %self.id, "Confirmation request abandoned");
        }
    }
}

impl ConfirmationService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Register a request and wait for its answer or the timeout.
    pub async fn request(&self, prompt: ConfirmationPrompt) -> ConfirmationOutcome {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        info!(
            request_id = %id,
            workflow_id = %prompt.workflow_id,
            task_id = %prompt.task_id,
            risk_level = %prompt.risk_level,
            timeout_secs = self.timeout.as_secs(),
            "Confirmation requested"
        );

        self.pending.write().insert(
            id,
            PendingRequest {
                prompt,
                created_at: Utc::now(),
                timeout: self.timeout,
                response_tx: tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without an answer
            Ok(Err(_)) => ConfirmationOutcome::Cancelled {
                cancelled_at: Utc::now(),
            },
            Err(_) => {
                warn!(request_id = %id, "Confirmation request timed out");
                ConfirmationOutcome::TimedOut {
                    timeout_at: Utc::now(),
                }
            }
        }
    }

    pub async fn approve(&self, id: Uuid, approved_by: Option<String>) -> Result<(), ConfirmationError> {
        let request = self.take(id)?;
        info!(request_id = %id, approved_by = ?approved_by, "Confirmation approved");
        Self::answer(
            id,
            request,
            ConfirmationOutcome::Approved {
                approved_by,
                approved_at: Utc::now(),
            },
        )
    }

    pub async fn decline(
        &self,
        id: Uuid,
        reason: impl Into<String>,
        declined_by: Option<String>,
    ) -> Result<(), ConfirmationError> {
        let reason = reason.into();
        let request = self.take(id)?;
        info!(request_id = %id, declined_by = ?declined_by, reason = %reason, "Confirmation declined");
        Self::answer(
            id,
            request,
            ConfirmationOutcome::Declined {
                reason,
                declined_by,
                declined_at: Utc::now(),
            },
        )
    }

    pub async fn cancel(&self, id: Uuid) -> Result<(), ConfirmationError> {
        let request = self.take(id)?;
        debug!(request_id = %id, "Confirmation request cancelled");
        Self::answer(
            id,
            request,
            ConfirmationOutcome::Cancelled {
                cancelled_at: Utc::now(),
            },
        )
    }

    /// Pending requests, oldest first.
    pub async fn list_pending(&self) -> Vec<PendingConfirmation> {
        let pending = self.pending.read();
        let mut list: Vec<_> = pending
            .iter()
            .map(|(id, req)| PendingConfirmation {
                id: *id,
                text: req.prompt.text(),
                prompt: req.prompt.clone(),
                created_at: req.created_at,
                timeout: req.timeout,
            })
            .collect();
        list.sort_by_key(|p| p.created_at);
        list
    }

    fn take(&self, id: Uuid) -> Result<PendingRequest, ConfirmationError> {
        self.pending.write().remove(&id).ok_or(ConfirmationError::NotFound(id))
    }

    fn answer(id: Uuid, request: PendingRequest, outcome: ConfirmationOutcome) -> Result<(), ConfirmationError> {
        request.response_tx.send(outcome).map_err(|_| {
            warn!(request_id = %id, "Answer arrived after the requester went away");
            ConfirmationError::Abandoned(id)
        })
    }
}

#[async_trait]
impl ConfirmationGate for ConfirmationService {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        self.request(prompt.clone()).await.is_approved()
    }
}
