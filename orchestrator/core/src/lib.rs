// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # opsdesk-core
//!
//! Dispatch core of the opsdesk IT-operations automation platform.
//!
//! # Architecture
//!
//! - **domain:** policies, request/response envelope, audit records,
//!   workflow graphs, events and configuration
//! - **application:** policy registry and authorization gate, intent
//!   router, confirmation gate, workflow coordinator
//! - **infrastructure:** audit sinks, event bus, pending-confirmation service
//!
//! Handlers for concrete back ends live outside this crate and plug in
//! through [`domain::handler::Handler`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::authorization::{AuthorizationGate, AuthorizationService, PolicyRegistry};
pub use application::confirmation::{AutoApprove, AutoDecline, ConfirmationGate, ConfirmationPrompt, FnConfirmation};
pub use application::router::{IntentRouter, RegistrationError};
pub use application::workflow_coordinator::{CoordinatorError, TaskReport, WorkflowCoordinator, WorkflowReport};
pub use domain::handler::Handler;
pub use domain::policy::{AuthorizationError, OperationPolicy, Principal, RiskLevel};
pub use domain::request::{ErrorCode, Request, RequestContext, RequestSource, Response, ResponseError};
pub use domain::workflow::{Task, TaskId, TaskStatus, Workflow, WorkflowId, WorkflowStatus};
