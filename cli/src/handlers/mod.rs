// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Simulated back-end handlers
//!
//! In-memory stand-ins for the directory, device-management and ticketing
//! integrations. Every request is authorized through the shared
//! [`AuthorizationService`] before any state is read or changed, and every
//! mutation leaves an audit record.

pub mod device;
pub mod directory;
pub mod ticket;

use serde_json::Value;
use std::sync::Arc;

use opsdesk_core::application::authorization::AuthorizationService;
use opsdesk_core::domain::handler::Handler;
use opsdesk_core::domain::request::{Request, Response, ResponseError};

pub use device::DeviceHandler;
pub use directory::DirectoryHandler;
pub use ticket::TicketHandler;

/// One of each simulated handler, all gated by `auth`.
pub fn simulated(auth: &AuthorizationService) -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(DirectoryHandler::seeded(auth.clone())),
        Arc::new(DeviceHandler::seeded(auth.clone())),
        Arc::new(TicketHandler::new(auth.clone())),
    ]
}

/// Authorize, then run `op`; every failure becomes a failed response.
fn guarded<F>(auth: &AuthorizationService, request: &Request, op: F) -> Response
where
    F: FnOnce() -> Result<Value, ResponseError>,
{
    if let Err(e) = auth.authorize(&request.intent, &request.context) {
        return Response::failure(&e);
    }
    match op() {
        Ok(data) => Response::ok(data),
        Err(e) => Response::failure(e),
    }
}

fn unsupported(handler: &str, request: &Request, supported: Vec<String>) -> ResponseError {
    ResponseError::new(
        "UNSUPPORTED_INTENT",
        format!("Intent {} not supported by {}", request.intent, handler),
    )
    .with_detail("supported_intents", supported)
}

fn not_found(code: &str, what: &str, id: &str) -> ResponseError {
    ResponseError::new(code, format!("{} '{}' not found", what, id)).with_detail("id", id)
}

/// `jdoe@contoso.com` and `JDoe` both name `jdoe`.
fn normalize_user(raw: &str) -> String {
    raw.split('@').next().unwrap_or(raw).trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_user() {
        assert_eq!(normalize_user("JDoe@contoso.com"), "jdoe");
        assert_eq!(normalize_user(" asmith "), "asmith");
    }
}
