// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Route a single request through the gate and the intent router.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use opsdesk_core::domain::request::Request;

use crate::desk::Desk;

use super::{parse_params, PrincipalArgs};

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Intent to dispatch, e.g. ad.user.lookup
    #[arg(value_name = "INTENT")]
    pub intent: String,

    /// Request parameters (key=value, repeatable)
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    #[command(flatten)]
    pub principal: PrincipalArgs,

    /// Print the raw response as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the audit records the request produced
    #[arg(long)]
    pub audit: bool,
}

pub async fn handle_command(args: RouteArgs, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let desk = Desk::load(config_path)?;
    let outcome = route(&desk, &args).await;
    desk.shutdown().await;
    outcome
}

async fn route(desk: &Desk, args: &RouteArgs) -> Result<ExitCode> {
    let parameters = parse_params(&args.params)?;
    let request = Request::new(args.intent.as_str(), args.principal.context()).with_parameters(parameters);
    debug!(intent = %request.intent, correlation_id = %request.context.correlation_id, "Routing request");

    let response = desk.router.route(request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response).context("Failed to serialize response")?);
    } else if response.success {
        println!(
            "{} {} via {} ({} ms)",
            "✓".green().bold(),
            args.intent,
            response.handler.as_deref().unwrap_or("-"),
            response.execution_time_ms.unwrap_or(0)
        );
        if let Some(data) = &response.data {
            println!("{}", serde_json::to_string_pretty(data).context("Failed to serialize result")?);
        }
    } else if let Some(error) = &response.error {
        println!("{} {}", format!("✗ {}:", error.code).red().bold(), error.message);
        if !error.details.is_empty() {
            println!("{}", serde_json::to_string_pretty(&error.details).context("Failed to serialize details")?);
        }
    }

    if args.audit {
        let records = desk.audit_log.records();
        println!();
        println!("{}", format!("Audit trail ({} records):", records.len()).bold());
        for record in records {
            let line = format!(
                "  {} {} {} risk={}",
                record.event_type, record.outcome, record.principal_id, record.risk_level
            );
            match record.error_message {
                Some(error) => println!("{} ({})", line.yellow(), error),
                None => println!("{}", line),
            }
        }
    }

    if response.success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}
