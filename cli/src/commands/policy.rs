// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy table commands
//!
//! Commands: list, check

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::desk::Desk;

use super::PrincipalArgs;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// List every operation policy
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate the gate for one operation without running it
    Check {
        /// Operation name, e.g. ad.password.reset
        #[arg(value_name = "OPERATION")]
        operation: String,

        #[command(flatten)]
        principal: PrincipalArgs,
    },
}

pub async fn handle_command(command: PolicyCommand, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let desk = Desk::load(config_path)?;
    let outcome = match command {
        PolicyCommand::List { json } => list(&desk, json).map(|()| ExitCode::SUCCESS),
        PolicyCommand::Check { operation, principal } => check(&desk, &operation, &principal),
    };
    desk.shutdown().await;
    outcome
}

fn list(desk: &Desk, json: bool) -> Result<()> {
    let policies = desk.registry.list();
    if json {
        println!("{}", serde_json::to_string_pretty(&policies).context("Failed to serialize policies")?);
        return Ok(());
    }

    let source = if desk.config.uses_builtin_policies() {
        "built-in"
    } else {
        "configured"
    };
    println!("{}", format!("{} operation policies ({}):", policies.len(), source).bold());
    println!();
    println!("  {:<30} {:<9} {:<9} {}", "OPERATION", "MIN RISK", "APPROVAL", "ROLES");
    for policy in policies {
        let approval = if policy.requires_approval { "required" } else { "-" };
        println!(
            "  {:<30} {:<9} {:<9} {}",
            policy.name,
            policy.min_risk_level.as_str(),
            approval,
            policy.required_roles.join(", ")
        );
    }
    Ok(())
}

fn check(desk: &Desk, operation: &str, args: &PrincipalArgs) -> Result<ExitCode> {
    let principal = args.principal();
    match desk
        .auth
        .gate()
        .authorize(operation, &principal, args.risk, args.approved)
    {
        Ok(()) => {
            println!(
                "{}",
                format!("✓ {} may perform {} at {} risk", principal.id, operation, args.risk).green()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{} {}", format!("✗ {}:", e.code()).red().bold(), e);
            Ok(ExitCode::from(2))
        }
    }
}
