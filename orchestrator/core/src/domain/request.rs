// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request / Response Envelope
//!
//! Every operation enters the core as a [`Request`] (intent + parameters +
//! [`RequestContext`]) and leaves it as a [`Response`]. A `Response` is always
//! produced; failures travel inside it as a structured [`ResponseError`] with a
//! machine-readable [`ErrorCode`], a human message and a details map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::domain::policy::{AuthorizationError, Principal, RiskLevel};

// ============================================================================
// Error Codes
// ============================================================================

/// Machine-readable failure code carried on every failed [`Response`].
///
/// Codes owned by this crate form a closed set. Codes reported by handlers
/// are carried unchanged in [`ErrorCode::Handler`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    PolicyNotFound,
    InsufficientRoles,
    InsufficientRiskLevel,
    ApprovalRequired,
    UnknownIntent,
    DuplicateIntentRegistration,
    WorkflowDeadlock,
    InvalidInput,
    HandlerPanicked,
    TaskTimeout,
    /// Opaque code reported by a handler.
    Handler(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PolicyNotFound => "POLICY_NOT_FOUND",
            Self::InsufficientRoles => "INSUFFICIENT_ROLES",
            Self::InsufficientRiskLevel => "INSUFFICIENT_RISK_LEVEL",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::UnknownIntent => "UNKNOWN_INTENT",
            Self::DuplicateIntentRegistration => "DUPLICATE_INTENT_REGISTRATION",
            Self::WorkflowDeadlock => "WORKFLOW_DEADLOCK",
            Self::InvalidInput => "INVALID_INPUT",
            Self::HandlerPanicked => "HANDLER_PANICKED",
            Self::TaskTimeout => "TASK_TIMEOUT",
            Self::Handler(code) => code,
        }
    }

    /// True for the authorization family of codes.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::PolicyNotFound
                | Self::InsufficientRoles
                | Self::InsufficientRiskLevel
                | Self::ApprovalRequired
        )
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "POLICY_NOT_FOUND" => Self::PolicyNotFound,
            "INSUFFICIENT_ROLES" => Self::InsufficientRoles,
            "INSUFFICIENT_RISK_LEVEL" => Self::InsufficientRiskLevel,
            "APPROVAL_REQUIRED" => Self::ApprovalRequired,
            "UNKNOWN_INTENT" => Self::UnknownIntent,
            "DUPLICATE_INTENT_REGISTRATION" => Self::DuplicateIntentRegistration,
            "WORKFLOW_DEADLOCK" => Self::WorkflowDeadlock,
            "INVALID_INPUT" => Self::InvalidInput,
            "HANDLER_PANICKED" => Self::HandlerPanicked,
            "TASK_TIMEOUT" => Self::TaskTimeout,
            _ => Self::Handler(code),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Handler(code) => code,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request Context
// ============================================================================

/// Channel a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Teams,
    Web,
    Cli,
    Api,
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Teams => "teams",
            Self::Web => "web",
            Self::Cli => "cli",
            Self::Api => "api",
        };
        f.write_str(s)
    }
}

/// Who is asking, from where, and how dangerous the ask was assessed to be.
///
/// Built once at the process edge and passed by value downstream. The
/// consuming `with_*` methods exist for construction only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub principal: Principal,
    pub source: RequestSource,
    pub correlation_id: String,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub approval_granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
}

impl RequestContext {
    /// New context with a random correlation id and no approval.
    pub fn new(principal: Principal, source: RequestSource, risk_level: RiskLevel) -> Self {
        Self {
            principal,
            source,
            correlation_id: Uuid::new_v4().to_string(),
            risk_level,
            tenant_id: None,
            department: None,
            approval_granted: false,
            approver_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_approval(mut self, approver_id: impl Into<String>) -> Self {
        self.approval_granted = true;
        self.approver_id = Some(approver_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn principal_id(&self) -> &str {
        &self.principal.id
    }

    /// Derive the context for one workflow step.
    ///
    /// Principal, source and organisational fields are inherited. The
    /// correlation id becomes `<parent>/<step>`, the risk level is the step's
    /// own, and approval is granted only when `approver` is given.
    pub fn for_task(&self, step: &str, risk_level: RiskLevel, approver: Option<&str>) -> Self {
        Self {
            principal: self.principal.clone(),
            source: self.source,
            correlation_id: format!("{}/{}", self.correlation_id, step),
            risk_level,
            tenant_id: self.tenant_id.clone(),
            department: self.department.clone(),
            approval_granted: approver.is_some(),
            approver_id: approver.map(str::to_string),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// Structured operation request, consumed by exactly one handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Dot-namespaced intent, e.g. `ad.password.reset`.
    pub intent: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub context: RequestContext,
}

impl Request {
    pub fn new(intent: impl Into<String>, context: RequestContext) -> Self {
        Self {
            intent: intent.into(),
            parameters: Map::new(),
            context,
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// String parameter that must be present and non-empty.
    pub fn require_str(&self, key: &str) -> Result<&str, ResponseError> {
        match self.param_str(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ResponseError::new(
                ErrorCode::InvalidInput,
                format!("'{}' parameter required for intent '{}'", key, self.intent),
            )
            .with_detail("parameter", key)),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Structured failure: code, human message and free-form details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ResponseError {
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&AuthorizationError> for ResponseError {
    fn from(err: &AuthorizationError) -> Self {
        let base = ResponseError::new(err.code(), err.to_string())
            .with_detail("operation", err.operation());
        match err {
            AuthorizationError::InsufficientRoles { required, actual, .. } => base
                .with_detail("required_roles", required.clone())
                .with_detail("actual_roles", actual.clone()),
            AuthorizationError::InsufficientRiskLevel { required, actual, .. } => base
                .with_detail("required_risk_level", required.as_str())
                .with_detail("actual_risk_level", actual.as_str()),
            AuthorizationError::PolicyNotFound { .. } | AuthorizationError::ApprovalRequired { .. } => base,
        }
    }
}

impl From<AuthorizationError> for ResponseError {
    fn from(err: AuthorizationError) -> Self {
        Self::from(&err)
    }
}

/// Outcome of handling one [`Request`].
///
/// `handler` and `execution_time_ms` are stamped by the intent router after
/// the handler returns; whatever the handler put there is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl Response {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            handler: None,
            execution_time_ms: None,
        }
    }

    pub fn failure(error: impl Into<ResponseError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            handler: None,
            execution_time_ms: None,
        }
    }

    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.error.as_ref().map(|e| &e.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::new(
            Principal::new("alice", ["it_helpdesk"]),
            RequestSource::Cli,
            RiskLevel::Low,
        )
    }

    #[test]
    fn test_error_code_wire_format() {
        assert_eq!(serde_json::to_string(&ErrorCode::UnknownIntent).unwrap(), "\"UNKNOWN_INTENT\"");
        let parsed: ErrorCode = serde_json::from_str("\"APPROVAL_REQUIRED\"").unwrap();
        assert_eq!(parsed, ErrorCode::ApprovalRequired);
    }

    #[test]
    fn test_handler_codes_carried_unchanged() {
        let parsed: ErrorCode = serde_json::from_str("\"AD_SERVER_UNREACHABLE\"").unwrap();
        assert_eq!(parsed, ErrorCode::Handler("AD_SERVER_UNREACHABLE".to_string()));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"AD_SERVER_UNREACHABLE\"");
        assert!(!parsed.is_authorization());
        assert!(ErrorCode::ApprovalRequired.is_authorization());
    }

    #[test]
    fn test_context_defaults() {
        let ctx = context();
        assert!(!ctx.approval_granted);
        assert!(ctx.approver_id.is_none());
        assert!(Uuid::parse_str(&ctx.correlation_id).is_ok());
        assert_ne!(ctx.correlation_id, context().correlation_id);
    }

    #[test]
    fn test_context_for_task() {
        let parent = context()
            .with_correlation_id("corr-1")
            .with_tenant("contoso")
            .with_department("finance");

        let child = parent.for_task("reset_password", RiskLevel::Medium, Some("alice"));
        assert_eq!(child.correlation_id, "corr-1/reset_password");
        assert_eq!(child.risk_level, RiskLevel::Medium);
        assert!(child.approval_granted);
        assert_eq!(child.approver_id.as_deref(), Some("alice"));
        assert_eq!(child.tenant_id.as_deref(), Some("contoso"));
        assert_eq!(child.principal, parent.principal);

        let unapproved = parent.with_approval("bob").for_task("check_user", RiskLevel::Low, None);
        assert!(!unapproved.approval_granted);
        assert!(unapproved.approver_id.is_none());
    }

    #[test]
    fn test_require_str() {
        let request = Request::new("ad.user.lookup", context())
            .with_param("username", "jdoe")
            .with_param("blank", "  ");

        assert_eq!(request.require_str("username").unwrap(), "jdoe");

        let missing = request.require_str("upn").unwrap_err();
        assert_eq!(missing.code, ErrorCode::InvalidInput);
        assert_eq!(missing.details.get("parameter"), Some(&json!("upn")));

        assert!(request.require_str("blank").is_err());
    }

    #[test]
    fn test_authorization_error_conversion_carries_details() {
        let err = AuthorizationError::InsufficientRiskLevel {
            operation: "ad.laps.retrieve".to_string(),
            required: RiskLevel::High,
            actual: RiskLevel::Low,
        };
        let response_error = ResponseError::from(&err);
        assert_eq!(response_error.code, ErrorCode::InsufficientRiskLevel);
        assert_eq!(response_error.details.get("required_risk_level"), Some(&json!("high")));
        assert_eq!(response_error.details.get("actual_risk_level"), Some(&json!("low")));
        assert_eq!(response_error.details.get("operation"), Some(&json!("ad.laps.retrieve")));
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let value = serde_json::to_value(Response::ok(json!({"username": "jdoe"}))).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"username": "jdoe"}}));

        let failure = Response::failure(ResponseError::new(ErrorCode::InvalidInput, "bad"));
        assert_eq!(failure.error_code(), Some(&ErrorCode::InvalidInput));
        assert!(!failure.success);
    }
}
