// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end runs of the workflow templates against the simulated handlers.

use std::sync::Arc;

use opsdesk::desk::Desk;
use opsdesk::templates::{self, TemplateArgs};
use opsdesk_core::application::confirmation::{AutoApprove, AutoDecline, ConfirmationPrompt, FnConfirmation};
use opsdesk_core::domain::audit::{AuditEventType, AuditOutcome};
use opsdesk_core::domain::config::DeskConfig;
use opsdesk_core::domain::policy::{Principal, RiskLevel};
use opsdesk_core::domain::request::{ErrorCode, Request, RequestContext, RequestSource};
use opsdesk_core::domain::workflow::{SkipReason, TaskStatus, WorkflowStatus};
use opsdesk_core::infrastructure::audit::InMemoryAuditSink;

fn desk() -> Desk {
    Desk::from_config(DeskConfig::default()).unwrap()
}

fn context(principal: &str, roles: &[&str]) -> RequestContext {
    RequestContext::new(Principal::new(principal, roles.iter().copied()), RequestSource::Cli, RiskLevel::Low)
}

fn args(target: &str, created_by: &str) -> TemplateArgs {
    TemplateArgs {
        target: target.to_string(),
        department: Some("Finance".to_string()),
        created_by: created_by.to_string(),
    }
}

#[tokio::test]
async fn test_password_reset_template_completes() {
    let desk = desk();
    let workflow = templates::build("password-reset", &args("jdoe", "tech1")).unwrap();

    let report = desk
        .coordinator()
        .execute(&workflow, &context("tech1", &["it_helpdesk"]), Arc::new(AutoApprove))
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::Completed);
    let reset = report.task("reset_password").unwrap();
    assert_eq!(reset.handler.as_deref(), Some("directory"));

    let records = desk.audit_log.records();
    assert!(records
        .iter()
        .any(|r| r.event_type == AuditEventType::PasswordReset && r.approver_id.as_deref() == Some("tech1")));
    assert!(records.iter().any(|r| r.event_type == AuditEventType::ApprovalGranted));
}

#[tokio::test]
async fn test_declined_reset_cascades() {
    let desk = desk();
    let workflow = templates::build("password-reset", &args("jdoe", "tech1")).unwrap();

    let report = desk
        .coordinator()
        .execute(&workflow, &context("tech1", &["it_helpdesk"]), Arc::new(AutoDecline))
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::PartiallyCompleted);
    assert_eq!(report.task("reset_password").unwrap().status, TaskStatus::Skipped(SkipReason::Declined));
    assert!(matches!(
        report.task("verify_signin").unwrap().status,
        TaskStatus::Skipped(SkipReason::DependencyUnmet { .. })
    ));
    assert!(!desk
        .audit_log
        .records()
        .iter()
        .any(|r| r.event_type == AuditEventType::PasswordReset));
}

#[tokio::test]
async fn test_helpdesk_cannot_finish_onboarding() {
    let desk = desk();
    let workflow = templates::build("onboarding", &args("mchen", "tech1")).unwrap();

    let report = desk
        .coordinator()
        .execute(&workflow, &context("tech1", &["it_helpdesk"]), Arc::new(AutoApprove))
        .await
        .unwrap();

    let license = report.task("assign_license").unwrap();
    assert_eq!(license.status, TaskStatus::Failed);
    assert_eq!(license.error.as_ref().map(|e| &e.code), Some(&ErrorCode::InsufficientRoles));
    assert!(matches!(
        report.task("create_ticket").unwrap().status,
        TaskStatus::Skipped(SkipReason::DependencyUnmet { .. })
    ));
    assert_eq!(report.status, WorkflowStatus::PartiallyCompleted);

    let denials = desk
        .audit_log
        .records()
        .into_iter()
        .filter(|r| r.event_type == AuditEventType::AuthDenied && r.outcome == AuditOutcome::Denied)
        .count();
    assert_eq!(denials, 2);
}

#[tokio::test]
async fn test_offboarding_with_declined_wipe() {
    let desk = desk();
    let workflow = templates::build("offboarding", &args("jdoe", "admin1")).unwrap();
    let gate = FnConfirmation::new(|prompt: ConfirmationPrompt| async move { prompt.task_id.as_str() != "wipe_devices" });

    let report = desk
        .coordinator()
        .execute(&workflow, &context("admin1", &["it_admin"]), Arc::new(gate))
        .await
        .unwrap();

    assert_eq!(report.task("list_devices").unwrap().status, TaskStatus::Completed);
    assert_eq!(report.task("remove_licenses").unwrap().status, TaskStatus::Completed);
    assert_eq!(report.task("wipe_devices").unwrap().status, TaskStatus::Skipped(SkipReason::Declined));
    assert!(matches!(
        report.task("create_ticket").unwrap().status,
        TaskStatus::Skipped(SkipReason::DependencyUnmet { .. })
    ));
    assert_eq!((report.completed, report.skipped), (2, 2));
}

#[tokio::test]
async fn test_device_compliance_template_fixes_device() {
    let desk = desk();
    let workflow = templates::build("device-compliance", &args("FIN-LT-0042", "tech1")).unwrap();

    let report = desk
        .coordinator()
        .execute(&workflow, &context("tech1", &["it_helpdesk"]), Arc::new(AutoDecline))
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::Completed);
    let before = report.task("check_compliance").unwrap().result.as_ref().unwrap();
    let after = report.task("verify_fixed").unwrap().result.as_ref().unwrap();
    assert_eq!(before["compliance_state"], "non_compliant");
    assert_eq!(after["compliance_state"], "compliant");
}

#[tokio::test]
async fn test_every_simulated_intent_has_a_builtin_policy() {
    let desk = desk();
    for intent in desk.router.available_intents() {
        assert!(desk.registry.contains(&intent), "no policy for {}", intent);
    }

    let lookup = Request::new("ad.user.lookup", context("viewer1", &["viewer"])).with_param("username", "jdoe");
    assert!(desk.router.route(lookup).await.success);
}

#[tokio::test]
async fn test_shutdown_flushes_audit_channel() {
    let writer = InMemoryAuditSink::new();
    let desk = Desk::with_audit_writer(DeskConfig::default(), Arc::new(writer.clone())).unwrap();

    let reset = Request::new("ad.password.reset", context("viewer1", &["viewer"])).with_param("username", "jdoe");
    let response = desk.router.route(reset).await;
    assert!(!response.success);

    let expected = desk.audit_log.records().len();
    desk.shutdown().await;

    let written = writer.records();
    assert_eq!(written.len(), expected);
    assert!(written
        .iter()
        .any(|r| r.event_type == AuditEventType::AuthDenied && r.principal_id == "viewer1"));
}
