// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Registered intent table

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

use crate::desk::Desk;

pub async fn handle_command(config_path: Option<PathBuf>, as_json: bool) -> Result<()> {
    let desk = Desk::load(config_path)?;
    let bindings = desk.router.bindings();

    if as_json {
        let rows: Vec<_> = bindings
            .iter()
            .map(|(intent, handler)| {
                json!({
                    "intent": intent,
                    "handler": handler,
                    "policy": desk.registry.contains(intent),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows).context("Failed to serialize intents")?);
        return Ok(());
    }

    println!("{}", format!("{} registered intents:", bindings.len()).bold());
    println!();
    println!("  {:<30} {:<10} {}", "INTENT", "HANDLER", "POLICY");
    for (intent, handler) in &bindings {
        let policy = if desk.registry.contains(intent) {
            "✓".green()
        } else {
            "none (denied)".red()
        };
        println!("  {:<30} {:<10} {}", intent, handler, policy);
    }
    Ok(())
}
