// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Intent Router
//!
//! Maps each intent to exactly one [`Handler`]. The map is built by
//! incremental registration at startup; a second handler claiming an intent is
//! a startup error, never a runtime one.
//!
//! `route` always yields a [`Response`]. Unknown intents, handler failures and
//! handler panics all come back as failed responses. The router is the single
//! authority for the `handler` and `execution_time_ms` fields.

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::handler::Handler;
use crate::domain::request::{ErrorCode, Request, Response, ResponseError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Intent '{intent}' is already handled by '{existing}', cannot register it for '{incoming}'")]
    DuplicateIntent {
        intent: String,
        existing: String,
        incoming: String,
    },

    #[error("Handler '{0}' declares no intents")]
    NoIntents(String),
}

impl RegistrationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateIntent { .. } => ErrorCode::DuplicateIntentRegistration,
            Self::NoIntents(_) => ErrorCode::InvalidInput,
        }
    }
}

#[derive(Default)]
pub struct IntentRouter {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl IntentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every handler in order, stopping at the first conflict.
    pub fn from_handlers(handlers: impl IntoIterator<Item = Arc<dyn Handler>>) -> Result<Self, RegistrationError> {
        let mut router = Self::new();
        for handler in handlers {
            router.register(handler)?;
        }
        Ok(router)
    }

    /// Claim all of the handler's intents, or none of them.
    ///
    /// Registering the same handler instance twice is a no-op.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<(), RegistrationError> {
        let mut intents = handler.supported_intents();
        intents.sort();
        intents.dedup();

        if intents.is_empty() {
            return Err(RegistrationError::NoIntents(handler.name().to_string()));
        }

        for intent in &intents {
            if let Some(existing) = self.handlers.get(intent) {
                if !Arc::ptr_eq(existing, &handler) {
                    return Err(RegistrationError::DuplicateIntent {
                        intent: intent.clone(),
                        existing: existing.name().to_string(),
                        incoming: handler.name().to_string(),
                    });
                }
            }
        }

        for intent in intents {
            debug!(intent = %intent, handler = handler.name(), "Registered intent");
            self.handlers.insert(intent, Arc::clone(&handler));
        }
        Ok(())
    }

    /// Registered intents in sorted order.
    pub fn available_intents(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn handler_for(&self, intent: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(intent)
    }

    /// Intent → handler name, sorted by intent.
    pub fn bindings(&self) -> Vec<(String, String)> {
        self.handlers
            .iter()
            .map(|(intent, handler)| (intent.clone(), handler.name().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn route(&self, request: Request) -> Response {
        let Some(handler) = self.handlers.get(&request.intent) else {
            warn!(
                intent = %request.intent,
                correlation_id = %request.context.correlation_id,
                "Unknown intent"
            );
            return Response::failure(
                ResponseError::new(
                    ErrorCode::UnknownIntent,
                    format!("No handler registered for intent '{}'", request.intent),
                )
                .with_detail("requested_intent", request.intent.as_str())
                .with_detail("available_intents", self.available_intents()),
            );
        };

        let intent = request.intent.clone();
        let correlation_id = request.context.correlation_id.clone();
        let start = Instant::now();

        let mut response = match AssertUnwindSafe(handler.handle(request)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                Response::failure(
                    ResponseError::new(
                        ErrorCode::HandlerPanicked,
                        format!("Handler '{}' panicked: {}", handler.name(), message),
                    )
                    .with_detail("intent", intent.as_str()),
                )
            }
        };

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        response.handler = Some(handler.name().to_string());
        response.execution_time_ms = Some(latency_ms);

        if response.success {
            info!(
                intent = %intent,
                handler = handler.name(),
                correlation_id = %correlation_id,
                latency_ms,
                "Request handled"
            );
        } else {
            warn!(
                intent = %intent,
                handler = handler.name(),
                correlation_id = %correlation_id,
                latency_ms,
                code = response.error_code().map(ErrorCode::as_str).unwrap_or("UNKNOWN"),
                "Request failed"
            );
        }

        response
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
