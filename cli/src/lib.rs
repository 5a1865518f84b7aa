// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! opsdesk CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Wires the dispatch core to simulated back-office handlers,
//!   workflow templates and terminal confirmation

pub mod commands;
pub mod confirm;
pub mod desk;
pub mod handlers;
pub mod templates;
