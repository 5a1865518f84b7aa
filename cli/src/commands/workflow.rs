// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `opsdesk workflow list` - List the built-in templates
//! - `opsdesk workflow show <template> --target <t>` - Print the expanded task graph
//! - `opsdesk workflow run <template> --target <t>` - Execute a template and print the report

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

use opsdesk_core::application::workflow_coordinator::CoordinatorError;
use opsdesk_core::domain::events::WorkflowEvent;
use opsdesk_core::domain::workflow::Workflow;
use opsdesk_core::infrastructure::event_bus::{EventBusError, WorkflowEventReceiver};

use crate::confirm;
use crate::desk::Desk;
use crate::templates::{self, TemplateArgs, TEMPLATES};

use super::PrincipalArgs;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List available workflow templates
    List,

    /// Show the tasks a template expands to
    Show {
        /// Template name
        #[arg(value_name = "TEMPLATE")]
        template: String,

        /// Target user or device
        #[arg(long, short = 't')]
        target: String,

        /// Department (onboarding)
        #[arg(long)]
        department: Option<String>,
    },

    /// Execute a template
    Run {
        /// Template name
        #[arg(value_name = "TEMPLATE")]
        template: String,

        /// Target user or device
        #[arg(long, short = 't')]
        target: String,

        /// Department (onboarding)
        #[arg(long)]
        department: Option<String>,

        /// External ticket to attach to the run
        #[arg(long)]
        ticket: Option<String>,

        #[command(flatten)]
        principal: PrincipalArgs,

        /// Approve every confirmation without prompting
        #[arg(long, short = 'y', conflicts_with = "no")]
        yes: bool,

        /// Decline every confirmation without prompting
        #[arg(long)]
        no: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: WorkflowCommand, config_path: Option<PathBuf>) -> Result<ExitCode> {
    match command {
        WorkflowCommand::List => {
            list_templates();
            Ok(ExitCode::SUCCESS)
        }
        WorkflowCommand::Show {
            template,
            target,
            department,
        } => show_template(&template, target, department).map(|()| ExitCode::SUCCESS),
        WorkflowCommand::Run {
            template,
            target,
            department,
            ticket,
            principal,
            yes,
            no,
            json,
        } => {
            let args = TemplateArgs {
                target,
                department,
                created_by: principal.principal.clone(),
            };
            let mut workflow = templates::build(&template, &args)?;
            if let Some(ticket) = ticket {
                workflow = workflow.with_ticket(ticket);
            }
            let desk = Desk::load(config_path)?;
            let outcome = run_workflow(&desk, workflow, &principal, yes, no, json).await;
            desk.shutdown().await;
            outcome
        }
    }
}

fn list_templates() {
    println!("{}", "📋 Workflow Templates".cyan().bold());
    println!();
    for info in TEMPLATES {
        println!("{}", format!("• {}", info.name).green().bold());
        println!("  Title:   {}", info.title);
        println!("  Target:  {}", info.target);
        println!("  Tasks:   {}", info.summary);
        println!();
    }
    println!("{}", "* = confirmation required".dimmed());
}

fn show_template(template: &str, target: String, department: Option<String>) -> Result<()> {
    let workflow = templates::build(
        template,
        &TemplateArgs {
            target,
            department,
            created_by: "-".to_string(),
        },
    )?;

    println!("{}", workflow.name.bold());
    println!("  {}", workflow.description);
    println!();
    for (i, task) in workflow.tasks.iter().enumerate() {
        let gate = if task.requires_confirmation {
            " [confirm]".yellow().to_string()
        } else {
            String::new()
        };
        println!("{}. {}{}", i + 1, task.id.as_str().bold(), gate);
        println!("   Intent:     {}", task.intent);
        println!("   Risk:       {}", task.risk_level);
        if !task.dependencies.is_empty() {
            let deps: Vec<&str> = task.dependencies.iter().map(|d| d.as_str()).collect();
            println!("   Depends on: {}", deps.join(", "));
        }
        println!(
            "   Parameters: {}",
            serde_json::to_string(&task.parameters).context("Failed to serialize parameters")?
        );
    }
    Ok(())
}

async fn run_workflow(
    desk: &Desk,
    workflow: Workflow,
    principal: &PrincipalArgs,
    yes: bool,
    no: bool,
    json: bool,
) -> Result<ExitCode> {
    let coordinator = desk.coordinator();
    let gate = confirm::from_flags(yes, no, desk.config.spec.confirmation.timeout);
    let context = principal.context();

    if !json {
        println!("{}", "🚀 Starting workflow execution...".cyan());
        println!("   Workflow: {}", workflow.name);
        println!("   ID:       {}", workflow.id);
        println!("   Tasks:    {}", workflow.tasks.len());
        println!();
    }

    let printer = (!json).then(|| tokio::spawn(print_events(desk.events.subscribe_workflow(workflow.id.clone()))));

    let result = coordinator.execute(&workflow, &context, gate).await;

    if let Some(printer) = printer {
        // Nothing is published for a workflow rejected by validation.
        if matches!(result, Err(CoordinatorError::InvalidWorkflow(_))) {
            printer.abort();
        } else if let Err(e) = printer.await {
            warn!("Event printer stopped: {}", e);
        }
    }

    let report = match result {
        Ok(report) => report,
        Err(CoordinatorError::Deadlock {
            workflow_id,
            pending,
            report,
        }) => {
            let pending: Vec<&str> = pending.iter().map(|t| t.as_str()).collect();
            eprintln!(
                "{}",
                format!("✗ Workflow {} deadlocked; still pending: {}", workflow_id, pending.join(", "))
                    .red()
                    .bold()
            );
            println!("{}", report.render());
            return Ok(ExitCode::from(3));
        }
        Err(e) => return Err(e).context("Workflow could not be executed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
    } else {
        println!();
        println!("{}", report.render());
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints one line per event until the run finishes.
async fn print_events(mut events: WorkflowEventReceiver) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let finished = matches!(event, WorkflowEvent::WorkflowFinished { .. });
                println!("{}", describe(&event));
                if finished {
                    break;
                }
            }
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

fn describe(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::WorkflowStarted { name, task_count, .. } => {
            format!("▶ {} ({} tasks)", name, task_count).cyan().to_string()
        }
        WorkflowEvent::TaskStarted { task_id, intent, .. } => format!("  ⏳ {} → {}", task_id, intent),
        WorkflowEvent::TaskCompleted {
            task_id,
            handler,
            latency_ms,
            ..
        } => format!(
            "  ✓ {} ({}, {} ms)",
            task_id,
            handler.as_deref().unwrap_or("-"),
            latency_ms.unwrap_or(0)
        )
        .green()
        .to_string(),
        WorkflowEvent::TaskFailed {
            task_id, code, message, ..
        } => format!("  ✗ {} {}: {}", task_id, code, message).red().to_string(),
        WorkflowEvent::TaskSkipped { task_id, reason, .. } => {
            format!("  ⊘ {} ({})", task_id, reason).yellow().to_string()
        }
        WorkflowEvent::WorkflowFinished {
            status,
            completed,
            failed,
            skipped,
            ..
        } => format!(
            "■ {} (completed {}, failed {}, skipped {})",
            status, completed, failed, skipped
        )
        .bold()
        .to_string(),
    }
}
