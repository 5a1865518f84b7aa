// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Records
//!
//! Append-only records describing authorization decisions and sensitive
//! outcomes. This crate only shapes them; storage belongs to whichever
//! [`crate::infrastructure::audit::AuditSink`] the caller wires in.
//!
//! Every record copies the full [`RequestContext`] (who, where, risk,
//! approval) so a single record is enough for forensics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::policy::RiskLevel;
use crate::domain::request::{RequestContext, RequestSource};

/// Kinds of auditable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "auth.success")]
    AuthSuccess,
    #[serde(rename = "auth.failure")]
    AuthFailure,
    #[serde(rename = "auth.denied")]
    AuthDenied,
    #[serde(rename = "auth.approval_granted")]
    ApprovalGranted,
    #[serde(rename = "auth.approval_declined")]
    ApprovalDeclined,

    #[serde(rename = "identity.lookup")]
    UserLookup,
    #[serde(rename = "identity.password_reset")]
    PasswordReset,
    #[serde(rename = "identity.account_unlock")]
    AccountUnlock,

    #[serde(rename = "privileged.laps_retrieve")]
    LapsRetrieve,
    #[serde(rename = "privileged.bitlocker_retrieve")]
    BitlockerRetrieve,

    #[serde(rename = "device.wipe")]
    DeviceWipe,
    #[serde(rename = "device.sync")]
    DeviceSync,
    #[serde(rename = "device.restart")]
    DeviceRestart,

    #[serde(rename = "access.license_assign")]
    LicenseAssign,
    #[serde(rename = "access.license_remove")]
    LicenseRemove,
    #[serde(rename = "access.group_add")]
    GroupAdd,

    #[serde(rename = "ticket.incident_create")]
    IncidentCreate,
    #[serde(rename = "ticket.incident_resolve")]
    IncidentResolve,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth.success",
            Self::AuthFailure => "auth.failure",
            Self::AuthDenied => "auth.denied",
            Self::ApprovalGranted => "auth.approval_granted",
            Self::ApprovalDeclined => "auth.approval_declined",
            Self::UserLookup => "identity.lookup",
            Self::PasswordReset => "identity.password_reset",
            Self::AccountUnlock => "identity.account_unlock",
            Self::LapsRetrieve => "privileged.laps_retrieve",
            Self::BitlockerRetrieve => "privileged.bitlocker_retrieve",
            Self::DeviceWipe => "device.wipe",
            Self::DeviceSync => "device.sync",
            Self::DeviceRestart => "device.restart",
            Self::LicenseAssign => "access.license_assign",
            Self::LicenseRemove => "access.license_remove",
            Self::GroupAdd => "access.group_add",
            Self::IncidentCreate => "ticket.incident_create",
            Self::IncidentResolve => "ticket.incident_resolve",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
    Partial,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub outcome: AuditOutcome,

    // Who
    pub principal_id: String,
    pub roles: Vec<String>,
    pub tenant_id: Option<String>,
    pub department: Option<String>,

    // Where
    pub source: RequestSource,
    pub correlation_id: String,

    // Risk context
    pub risk_level: RiskLevel,
    pub approval_granted: bool,
    pub approver_id: Option<String>,

    // What
    #[serde(default)]
    pub details: Map<String, Value>,
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(event_type: AuditEventType, context: &RequestContext, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            outcome,
            principal_id: context.principal.id.clone(),
            roles: context.principal.roles.clone(),
            tenant_id: context.tenant_id.clone(),
            department: context.department.clone(),
            source: context.source,
            correlation_id: context.correlation_id.clone(),
            risk_level: context.risk_level,
            approval_granted: context.approval_granted,
            approver_id: context.approver_id.clone(),
            details: Map::new(),
            error_message: None,
        }
    }

    pub fn success(event_type: AuditEventType, context: &RequestContext) -> Self {
        Self::new(event_type, context, AuditOutcome::Success)
    }

    /// Failure record carrying the error's display text.
    pub fn failure(event_type: AuditEventType, context: &RequestContext, error: &dyn fmt::Display) -> Self {
        Self::new(event_type, context, AuditOutcome::Failure).with_error(error.to_string())
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::Principal;
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::new(Principal::new("admin1", ["it_admin"]), RequestSource::Teams, RiskLevel::Critical)
            .with_correlation_id("corr-42")
            .with_tenant("contoso")
            .with_approval("manager7")
    }

    #[test]
    fn test_record_copies_full_context() {
        let record = AuditRecord::success(AuditEventType::DeviceWipe, &context())
            .with_detail("device", "LAPTOP-01");

        assert_eq!(record.principal_id, "admin1");
        assert_eq!(record.roles, vec!["it_admin".to_string()]);
        assert_eq!(record.tenant_id.as_deref(), Some("contoso"));
        assert_eq!(record.source, RequestSource::Teams);
        assert_eq!(record.correlation_id, "corr-42");
        assert_eq!(record.risk_level, RiskLevel::Critical);
        assert!(record.approval_granted);
        assert_eq!(record.approver_id.as_deref(), Some("manager7"));
        assert_eq!(record.details.get("device"), Some(&json!("LAPTOP-01")));
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_failure_record_carries_error_message() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "graph api timed out");
        let record = AuditRecord::failure(AuditEventType::LicenseAssign, &context(), &err);
        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error_message.as_deref(), Some("graph api timed out"));
    }

    #[test]
    fn test_event_type_wire_names_match_display() {
        for event in [
            AuditEventType::AuthDenied,
            AuditEventType::ApprovalDeclined,
            AuditEventType::PasswordReset,
            AuditEventType::IncidentResolve,
        ] {
            let wire = serde_json::to_value(event).unwrap();
            assert_eq!(wire, json!(event.as_str()));
        }
    }
}
