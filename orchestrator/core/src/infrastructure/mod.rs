// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod confirmation_service;
pub mod event_bus;

pub use audit::{AuditSink, ChannelAuditSink, CompositeAuditSink, InMemoryAuditSink, TracingAuditSink};
pub use confirmation_service::{ConfirmationError, ConfirmationOutcome, ConfirmationService, PendingConfirmation};
pub use event_bus::{EventBus, EventReceiver, WorkflowEventReceiver};
