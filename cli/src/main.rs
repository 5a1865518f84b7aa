// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # opsdesk CLI
//!
//! The `opsdesk` binary drives the dispatch core against simulated
//! directory, device-management and ticketing back ends.
//!
//! ## Commands
//!
//! - `opsdesk policy list|check` - Inspect and evaluate the policy table
//! - `opsdesk intents` - Registered intent to handler table
//! - `opsdesk route <intent>` - Dispatch a single request
//! - `opsdesk workflow list|show|run` - Multi-step procedures
//! - `opsdesk config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use opsdesk::commands::{self, ConfigCommand, PolicyCommand, RouteArgs, WorkflowCommand};

/// opsdesk - IT-operations dispatch and workflow automation
#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "OPSDESK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "OPSDESK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "OPSDESK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Operation policy table
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// List registered intents and their handlers
    #[command(name = "intents")]
    Intents {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dispatch a single request
    #[command(name = "route")]
    Route(RouteArgs),

    /// Workflow templates and execution
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Policy { command }) => commands::policy::handle_command(command, cli.config).await,
        Some(Commands::Intents { json }) => commands::intents::handle_command(cli.config, json)
            .await
            .map(|()| ExitCode::SUCCESS),
        Some(Commands::Route(args)) => commands::route::handle_command(args, cli.config).await,
        Some(Commands::Workflow { command }) => commands::workflow::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config)
            .await
            .map(|()| ExitCode::SUCCESS),
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.with_target(false).compact().init(),
        LogFormat::Json => builder.with_target(true).json().init(),
    }

    Ok(())
}
