// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Application Service
//!
//! - [`PolicyRegistry`]: immutable operation → policy map, built once at
//!   startup from the built-in table or a [`DeskConfig`].
//! - [`AuthorizationGate`]: pure fail-closed check over the registry.
//! - [`AuthorizationService`]: the gate plus one audit record per decision.
//!   Handlers call this before every side effect.
//!
//! Check order is fixed: policy lookup, roles, risk, approval. The first
//! failing check decides the error.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::audit::{AuditEventType, AuditOutcome, AuditRecord};
use crate::domain::config::{ConfigError, DeskConfig};
use crate::domain::policy::{AuthorizationError, OperationPolicy, PolicyError, Principal, RiskLevel};
use crate::domain::request::RequestContext;
use crate::infrastructure::audit::AuditSink;

// ============================================================================
// Policy Registry
// ============================================================================

const READERS: &[&str] = &["it_helpdesk", "it_admin", "viewer"];
const OPERATORS: &[&str] = &["it_helpdesk", "it_admin"];
const ADMINS: &[&str] = &["it_admin"];

const BUILTIN_POLICIES: &[(&str, &[&str], RiskLevel, bool)] = &[
    // Directory
    ("ad.user.lookup", READERS, RiskLevel::Low, false),
    ("ad.password.reset", OPERATORS, RiskLevel::Medium, true),
    ("ad.account.unlock", OPERATORS, RiskLevel::Low, false),
    ("ad.laps.retrieve", ADMINS, RiskLevel::High, true),
    ("ad.bitlocker.retrieve", OPERATORS, RiskLevel::Medium, true),
    // Graph
    ("graph.user.get", READERS, RiskLevel::Low, false),
    ("graph.signin.list", READERS, RiskLevel::Low, false),
    ("graph.license.assign", ADMINS, RiskLevel::Medium, true),
    ("graph.license.remove", ADMINS, RiskLevel::Medium, true),
    ("graph.group.add_member", ADMINS, RiskLevel::Medium, true),
    // Ticketing
    ("servicenow.incident.search", READERS, RiskLevel::Low, false),
    ("servicenow.incident.create", OPERATORS, RiskLevel::Low, false),
    ("servicenow.incident.resolve", OPERATORS, RiskLevel::Low, false),
    // Devices
    ("intune.device.get", READERS, RiskLevel::Low, false),
    ("intune.device.list", READERS, RiskLevel::Low, false),
    ("intune.device.compliance", READERS, RiskLevel::Low, false),
    ("intune.device.sync", OPERATORS, RiskLevel::Low, false),
    ("intune.device.restart", OPERATORS, RiskLevel::Medium, true),
    ("intune.device.wipe", ADMINS, RiskLevel::Critical, true),
];

/// Immutable map from operation name to its policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, OperationPolicy>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Operational defaults for the directory, graph, ticketing and device
    /// integrations.
    pub fn builtin() -> Self {
        let policies = BUILTIN_POLICIES
            .iter()
            .map(|(name, roles, risk, approval)| {
                (
                    name.to_string(),
                    OperationPolicy::new(*name, roles.iter().copied(), *risk, *approval),
                )
            })
            .collect();
        Self { policies }
    }

    pub fn from_policies(policies: impl IntoIterator<Item = OperationPolicy>) -> Result<Self, PolicyError> {
        let mut builder = Self::builder();
        for policy in policies {
            builder.add(policy)?;
        }
        Ok(builder.build())
    }

    /// Validated config table, or the built-in one when the config names none.
    pub fn from_config(config: &DeskConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.uses_builtin_policies() {
            return Ok(Self::builtin());
        }
        Ok(Self::from_policies(config.spec.policies.iter().cloned())?)
    }

    pub fn get(&self, operation: &str) -> Result<&OperationPolicy, AuthorizationError> {
        self.policies
            .get(operation)
            .ok_or_else(|| AuthorizationError::PolicyNotFound {
                operation: operation.to_string(),
            })
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.policies.contains_key(operation)
    }

    /// All policies in operation-name order.
    pub fn list(&self) -> Vec<&OperationPolicy> {
        self.policies.values().collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    policies: BTreeMap<String, OperationPolicy>,
}

impl PolicyRegistryBuilder {
    /// Rejects structurally invalid policies and a second policy for an
    /// operation already present.
    pub fn add(&mut self, policy: OperationPolicy) -> Result<&mut Self, PolicyError> {
        policy.validate()?;
        if self.policies.contains_key(&policy.name) {
            return Err(PolicyError::DuplicatePolicy(policy.name));
        }
        self.policies.insert(policy.name.clone(), policy);
        Ok(self)
    }

    pub fn build(self) -> PolicyRegistry {
        PolicyRegistry {
            policies: self.policies,
        }
    }
}

// ============================================================================
// Authorization Gate
// ============================================================================

/// Pure authorization check. No side effects, no audit.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    registry: Arc<PolicyRegistry>,
}

impl AuthorizationGate {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn authorize(
        &self,
        operation: &str,
        principal: &Principal,
        risk_level: RiskLevel,
        approved: bool,
    ) -> Result<(), AuthorizationError> {
        let policy = self.registry.get(operation)?;

        if !principal.has_any_role(&policy.required_roles) {
            return Err(AuthorizationError::InsufficientRoles {
                operation: operation.to_string(),
                principal: principal.id.clone(),
                required: policy.required_roles.clone(),
                actual: principal.roles.clone(),
            });
        }

        if risk_level < policy.min_risk_level {
            return Err(AuthorizationError::InsufficientRiskLevel {
                operation: operation.to_string(),
                required: policy.min_risk_level,
                actual: risk_level,
            });
        }

        if policy.requires_approval && !approved {
            return Err(AuthorizationError::ApprovalRequired {
                operation: operation.to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Audited Authorization
// ============================================================================

/// Gate plus audit trail. Cheap to clone.
#[derive(Clone)]
pub struct AuthorizationService {
    gate: AuthorizationGate,
    audit: Arc<dyn AuditSink>,
}

impl AuthorizationService {
    pub fn new(gate: AuthorizationGate, audit: Arc<dyn AuditSink>) -> Self {
        Self { gate, audit }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Run the gate for `context` and record the decision.
    pub fn authorize(&self, operation: &str, context: &RequestContext) -> Result<(), AuthorizationError> {
        let decision = self.gate.authorize(
            operation,
            &context.principal,
            context.risk_level,
            context.approval_granted,
        );

        match &decision {
            Ok(()) => {
                debug!(
                    operation,
                    principal_id = %context.principal.id,
                    correlation_id = %context.correlation_id,
                    "Authorization granted"
                );
                self.audit.record(
                    AuditRecord::success(AuditEventType::AuthSuccess, context).with_detail("operation", operation),
                );
            }
            Err(e) => {
                warn!(
                    operation,
                    principal_id = %context.principal.id,
                    correlation_id = %context.correlation_id,
                    code = %e.code(),
                    "Authorization denied"
                );
                self.audit.record(
                    AuditRecord::new(AuditEventType::AuthDenied, context, AuditOutcome::Denied)
                        .with_detail("operation", operation)
                        .with_detail("error_code", e.code().as_str())
                        .with_error(e.to_string()),
                );
            }
        }

        decision
    }

    /// Record a business outcome through the same sink.
    pub fn record(&self, record: AuditRecord) {
        self.audit.record(record);
    }
}
