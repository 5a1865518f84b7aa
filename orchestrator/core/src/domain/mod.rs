// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod config;
pub mod events;
pub mod handler;
pub mod policy;
pub mod request;
pub mod workflow;
