// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handler
//!
//! Capability interface implemented by each business-domain integration
//! (directory, device management, ticketing) and consumed by the intent
//! router.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption boundary between routing and side effects

use async_trait::async_trait;

use crate::domain::request::{Request, Response};

/// A component able to perform one or more intents.
///
/// `handle` must turn every failure into a failed [`Response`]. The router
/// additionally contains panics, but a well-behaved handler never relies on
/// that.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable name stamped onto every routed [`Response`].
    fn name(&self) -> &str;

    /// Intents this handler claims. Each intent may be claimed by one handler only.
    fn supported_intents(&self) -> Vec<String>;

    /// Perform the request. Consumes it.
    async fn handle(&self, request: Request) -> Response;
}
