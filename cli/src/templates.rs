// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pre-built service-desk procedures
//!
//! Each template expands into a [`Workflow`] for one target user or device.
//! Tasks marked `requiring_confirmation` stop for approval before they run.

use anyhow::{bail, Result};
use serde_json::json;

use opsdesk_core::domain::policy::RiskLevel;
use opsdesk_core::domain::workflow::{Task, Workflow};

/// Catalog entry shown by `workflow list`.
#[derive(Debug, Clone, Copy)]
pub struct TemplateInfo {
    pub name: &'static str,
    pub title: &'static str,
    /// What `--target` names.
    pub target: &'static str,
    pub summary: &'static str,
}

pub const TEMPLATES: &[TemplateInfo] = &[
    TemplateInfo {
        name: "password-reset",
        title: "Password Reset & Verification",
        target: "user",
        summary: "check_user -> reset_password* -> verify_signin",
    },
    TemplateInfo {
        name: "device-compliance",
        title: "Device Compliance Troubleshooting",
        target: "device",
        summary: "check_compliance -> sync_device -> verify_fixed",
    },
    TemplateInfo {
        name: "onboarding",
        title: "New Employee Onboarding",
        target: "user",
        summary: "verify_ad_account -> {assign_license*, add_to_groups*} -> create_ticket",
    },
    TemplateInfo {
        name: "offboarding",
        title: "Employee Offboarding",
        target: "user",
        summary: "{list_devices, remove_licenses*} -> wipe_devices* -> create_ticket",
    },
];

/// Parameters a template is instantiated with.
#[derive(Debug, Clone)]
pub struct TemplateArgs {
    pub target: String,
    pub department: Option<String>,
    pub created_by: String,
}

pub fn build(name: &str, args: &TemplateArgs) -> Result<Workflow> {
    let workflow = match name {
        "password-reset" => password_reset(args),
        "device-compliance" => device_compliance(args),
        "onboarding" => onboarding(args),
        "offboarding" => offboarding(args),
        other => {
            let known: Vec<&str> = TEMPLATES.iter().map(|t| t.name).collect();
            bail!("Unknown workflow template '{}'. Available: {}", other, known.join(", "));
        }
    };
    Ok(workflow)
}

pub fn password_reset(args: &TemplateArgs) -> Workflow {
    let user = &args.target;
    Workflow::new(
        "Password Reset & Verification",
        format!("Reset password for {} and verify resolution", user),
        &args.created_by,
    )
    .with_task(Task::new("check_user", "ad.user.lookup", format!("Get info for {}", user)).with_param("username", user.as_str()))
    .with_task(
        Task::new("reset_password", "ad.password.reset", format!("Reset password for {}", user))
            .with_param("username", user.as_str())
            .with_risk(RiskLevel::Medium)
            .requiring_confirmation()
            .depends_on("check_user"),
    )
    .with_task(
        Task::new("verify_signin", "graph.signin.list", format!("Check recent sign-in logs for {}", user))
            .with_param("user", user.as_str())
            .depends_on("reset_password"),
    )
}

pub fn device_compliance(args: &TemplateArgs) -> Workflow {
    let device = &args.target;
    Workflow::new(
        "Device Compliance Troubleshooting",
        format!("Diagnose and fix compliance issues for {}", device),
        &args.created_by,
    )
    .with_task(
        Task::new("check_compliance", "intune.device.compliance", format!("Check compliance status for {}", device))
            .with_param("device", device.as_str()),
    )
    .with_task(
        Task::new("sync_device", "intune.device.sync", format!("Sync device {} to re-evaluate compliance", device))
            .with_param("device", device.as_str())
            .depends_on("check_compliance"),
    )
    .with_task(
        Task::new("verify_fixed", "intune.device.compliance", format!("Re-check compliance for {} after sync", device))
            .with_param("device", device.as_str())
            .depends_on("sync_device"),
    )
}

pub fn onboarding(args: &TemplateArgs) -> Workflow {
    let user = &args.target;
    let department = args.department.as_deref().unwrap_or("General");
    let team = format!("{}-Team", department);
    Workflow::new(
        "New Employee Onboarding",
        format!("Complete setup for new employee {}", user),
        &args.created_by,
    )
    .with_task(
        Task::new("verify_ad_account", "ad.user.lookup", format!("Check if {} exists in AD", user))
            .with_param("username", user.as_str()),
    )
    .with_task(
        Task::new("assign_license", "graph.license.assign", format!("Assign Office 365 E3 license to {}", user))
            .with_param("username", user.as_str())
            .with_param("sku", "O365_E3")
            .with_risk(RiskLevel::Medium)
            .requiring_confirmation()
            .depends_on("verify_ad_account"),
    )
    .with_task(
        Task::new("add_to_groups", "graph.group.add_member", format!("Add {} to VPN-Users and {} groups", user, team))
            .with_param("username", user.as_str())
            .with_param("groups", json!(["VPN-Users", team]))
            .with_risk(RiskLevel::Medium)
            .requiring_confirmation()
            .depends_on("verify_ad_account"),
    )
    .with_task(
        Task::new("create_ticket", "servicenow.incident.create", format!("Create onboarding tracking ticket for {}", user))
            .with_param("short_description", format!("Onboarding: {} ({})", user, department))
            .with_param("caller", user.as_str())
            .with_param("category", "onboarding")
            .depends_on("assign_license")
            .depends_on("add_to_groups"),
    )
}

pub fn offboarding(args: &TemplateArgs) -> Workflow {
    let user = &args.target;
    Workflow::new(
        "Employee Offboarding",
        format!("Remove access and reclaim resources for {}", user),
        &args.created_by,
    )
    .with_task(
        Task::new("list_devices", "intune.device.list", format!("List all devices for {}", user))
            .with_param("user", user.as_str()),
    )
    .with_task(
        Task::new("remove_licenses", "graph.license.remove", format!("Remove all licenses from {}", user))
            .with_param("username", user.as_str())
            .with_risk(RiskLevel::Medium)
            .requiring_confirmation(),
    )
    .with_task(
        Task::new("wipe_devices", "intune.device.wipe", format!("Wipe all company devices for {}", user))
            .with_param("user", user.as_str())
            .with_risk(RiskLevel::Critical)
            .requiring_confirmation()
            .depends_on("list_devices"),
    )
    .with_task(
        Task::new("create_ticket", "servicenow.incident.create", format!("Create offboarding completion ticket for {}", user))
            .with_param("short_description", format!("Offboarding complete: {}", user))
            .with_param("caller", user.as_str())
            .with_param("category", "offboarding")
            .depends_on("remove_licenses")
            .depends_on("wipe_devices"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str) -> TemplateArgs {
        TemplateArgs {
            target: target.to_string(),
            department: Some("Sales".to_string()),
            created_by: "tech1".to_string(),
        }
    }

    #[test]
    fn test_every_template_is_a_valid_graph() {
        for info in TEMPLATES {
            let workflow = build(info.name, &args("jdoe")).unwrap();
            assert_eq!(workflow.name, info.title);
            workflow.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_template_lists_available() {
        let err = build("reimage", &args("jdoe")).unwrap_err().to_string();
        assert!(err.contains("password-reset") && err.contains("offboarding"));
    }

    #[test]
    fn test_offboarding_wipe_is_gated_and_critical() {
        let workflow = offboarding(&args("jdoe"));
        let wipe = workflow.tasks.iter().find(|t| t.id.as_str() == "wipe_devices").unwrap();
        assert!(wipe.requires_confirmation);
        assert_eq!(wipe.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_onboarding_uses_department_team() {
        let workflow = onboarding(&args("mchen"));
        let groups = &workflow.tasks[2].parameters["groups"];
        assert_eq!(groups, &json!(["VPN-Users", "Sales-Team"]));
    }
}
