// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod authorization;
pub mod confirmation;
pub mod router;
pub mod workflow_coordinator;
