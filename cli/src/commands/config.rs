// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use opsdesk_core::domain::config::{DeskConfig, ENV_CONFIG_PATH};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./opsdesk-config.yaml)
        #[arg(short, long, default_value = "./opsdesk-config.yaml")]
        output: PathBuf,

        /// Include an explicit policy table and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = DeskConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            ENV_CONFIG_PATH,
            std::env::var(ENV_CONFIG_PATH)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./opsdesk-config.yaml");
        println!("  4. ~/.opsdesk/config.yaml");
        println!("  5. /etc/opsdesk/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string().context("Failed to serialize configuration")?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Desk:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "Coordinator:".bold());
    println!(
        "  Task timeout: {}",
        seconds(config.spec.coordinator.task_timeout)
    );
    println!("  Max concurrency: {}", config.spec.coordinator.max_concurrency);
    println!();

    println!("{}", "Confirmation:".bold());
    println!("  Timeout: {}", seconds(config.spec.confirmation.timeout));
    println!();

    println!("{}", "Audit:".bold());
    println!("  Channel capacity: {}", config.spec.audit.channel_capacity);
    println!();

    println!("{}", "Policies:".bold());
    if config.uses_builtin_policies() {
        println!("  {}", "(built-in table)".dimmed());
    } else {
        for policy in &config.spec.policies {
            println!(
                "  {} ({}, approval: {}) → {}",
                policy.name.bold(),
                policy.min_risk_level,
                policy.requires_approval,
                policy.required_roles.join(", ")
            );
        }
    }
    println!();

    Ok(())
}

fn seconds(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = DeskConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use opsdesk_core::domain::config::DeskConfig;

    #[test]
    fn test_bundled_templates_are_valid() {
        for sample in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = DeskConfig::from_yaml_str(sample).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_example_policies_cover_templates() {
        let config = DeskConfig::from_yaml_str(include_str!("../../templates/config-with-examples.yaml")).unwrap();
        for operation in ["ad.password.reset", "intune.device.wipe", "servicenow.incident.create"] {
            assert!(
                config.spec.policies.iter().any(|p| p.name == operation),
                "missing policy for {}",
                operation
            );
        }
    }
}
