// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access-Control Policy Domain
//!
//! Value objects consumed by the authorization gate:
//!
//! - [`RiskLevel`] — totally ordered danger classification (`low < medium < high < critical`).
//! - [`Principal`] — the authenticated caller and its role labels.
//! - [`OperationPolicy`] — who may run an operation, at what minimum risk, and
//!   whether explicit approval is mandatory.
//! - [`AuthorizationError`] — the closed set of gate failures.
//!
//! Policies are immutable once built. The registry that owns them lives in
//! [`crate::application::authorization`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::request::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Invalid risk level: {0} (expected low, medium, high or critical)")]
    InvalidRiskLevel(String),

    #[error("Duplicate policy for operation '{0}'")]
    DuplicatePolicy(String),

    #[error("Policy '{0}' must name at least one role")]
    NoRoles(String),

    #[error("Policy name cannot be empty")]
    EmptyName,
}

// ============================================================================
// Value Objects
// ============================================================================

/// Assessed danger of an operation.
///
/// Variant order is the total order used by the gate's risk check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(PolicyError::InvalidRiskLevel(s.to_string())),
        }
    }
}

/// Authenticated identity invoking an operation.
///
/// Verified upstream; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True when the principal holds at least one of `roles`.
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.has_role(r.as_ref()))
    }
}

/// Access-control rule for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPolicy {
    /// Operation name, e.g. `ad.password.reset`.
    pub name: String,
    /// Roles allowed to perform the operation. Holding any one is enough.
    pub required_roles: Vec<String>,
    /// Minimum assessed risk a request must declare.
    pub min_risk_level: RiskLevel,
    /// Whether explicit approval must already be granted.
    #[serde(default)]
    pub requires_approval: bool,
}

impl OperationPolicy {
    pub fn new<I, S>(
        name: impl Into<String>,
        required_roles: I,
        min_risk_level: RiskLevel,
        requires_approval: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            required_roles: required_roles.into_iter().map(Into::into).collect(),
            min_risk_level,
            requires_approval,
        }
    }

    /// Structural checks applied before a policy enters a registry.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if self.required_roles.is_empty() {
            return Err(PolicyError::NoRoles(self.name.clone()));
        }
        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why the authorization gate refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("No policy defined for operation '{operation}'. Add a policy to the registry before allowing this operation")]
    PolicyNotFound { operation: String },

    #[error("Principal '{principal}' lacks required roles for '{operation}'. Required: [{}], principal has: [{}]", .required.join(", "), .actual.join(", "))]
    InsufficientRoles {
        operation: String,
        principal: String,
        required: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Operation '{operation}' requires at least '{required}' risk level, but request has '{actual}'")]
    InsufficientRiskLevel {
        operation: String,
        required: RiskLevel,
        actual: RiskLevel,
    },

    #[error("Operation '{operation}' requires explicit approval. The principal must confirm before proceeding")]
    ApprovalRequired { operation: String },
}

impl AuthorizationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PolicyNotFound { .. } => ErrorCode::PolicyNotFound,
            Self::InsufficientRoles { .. } => ErrorCode::InsufficientRoles,
            Self::InsufficientRiskLevel { .. } => ErrorCode::InsufficientRiskLevel,
            Self::ApprovalRequired { .. } => ErrorCode::ApprovalRequired,
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::PolicyNotFound { operation }
            | Self::InsufficientRoles { operation, .. }
            | Self::InsufficientRiskLevel { operation, .. }
            | Self::ApprovalRequired { operation } => operation,
        }
    }
}
