// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the opsdesk CLI

pub mod config;
pub mod intents;
pub mod policy;
pub mod route;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::policy::PolicyCommand;
pub use self::route::RouteArgs;
pub use self::workflow::WorkflowCommand;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::{Map, Value};

use opsdesk_core::domain::policy::{Principal, RiskLevel};
use opsdesk_core::domain::request::{RequestContext, RequestSource};

/// Who the command acts as.
#[derive(Args, Debug, Clone)]
pub struct PrincipalArgs {
    /// Acting principal id
    #[arg(long, env = "OPSDESK_PRINCIPAL", default_value = "tech1")]
    pub principal: String,

    /// Roles held by the principal (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "it_helpdesk")]
    pub roles: Vec<String>,

    /// Declared risk level (low, medium, high, critical)
    #[arg(long, default_value = "low")]
    pub risk: RiskLevel,

    /// Treat the request as already approved by the principal
    #[arg(long)]
    pub approved: bool,
}

impl PrincipalArgs {
    pub fn principal(&self) -> Principal {
        Principal::new(self.principal.as_str(), self.roles.iter().map(String::as_str))
    }

    pub fn context(&self) -> RequestContext {
        let context = RequestContext::new(self.principal(), RequestSource::Cli, self.risk);
        if self.approved {
            context.with_approval(self.principal.as_str())
        } else {
            context
        }
    }
}

/// Parse `key=value` pairs. Values are read as JSON when they parse, else as strings.
pub fn parse_params(params: &[String]) -> Result<Map<String, Value>> {
    let mut parsed = Map::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("Invalid parameter format: '{}'. Expected 'key=value'", param);
        };
        if key.trim().is_empty() {
            bail!("Invalid parameter format: '{}'. Key is empty", param);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        parsed.insert(key.trim().to_string(), value);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_prefer_json_values() {
        let params = parse_params(&[
            "username=jdoe".to_string(),
            "groups=[\"VPN-Users\"]".to_string(),
            "force=true".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(params["username"], "jdoe");
        assert_eq!(params["groups"], json!(["VPN-Users"]));
        assert_eq!(params["force"], true);
        assert_eq!(params["note"], "a=b");
    }

    #[test]
    fn test_params_require_separator() {
        assert!(parse_params(&["username".to_string()]).is_err());
        assert!(parse_params(&["=jdoe".to_string()]).is_err());
    }
}
