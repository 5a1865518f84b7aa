// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for workflow events
//
// In-memory fan-out over a tokio broadcast channel. Publishing never blocks
// and never fails the publisher; slow subscribers lag and lose old events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::WorkflowEvent;
use crate::domain::workflow::WorkflowId;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<WorkflowEvent>>,
}

impl EventBus {
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: WorkflowEvent) {
        debug!(workflow_id = %event.workflow_id(), "Publishing event: {:?}", event);
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of one workflow run only.
    pub fn subscribe_workflow(&self, workflow_id: WorkflowId) -> WorkflowEventReceiver {
        WorkflowEventReceiver {
            receiver: self.sender.subscribe(),
            workflow_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single workflow id
pub struct WorkflowEventReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
    workflow_id: WorkflowId,
}

impl WorkflowEventReceiver {
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.workflow_id() == &self.workflow_id {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
