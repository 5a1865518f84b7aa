// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Desk Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) carrying:
// - the declarative operation policy table
// - coordinator deadlines and concurrency bound
// - confirmation timeout
// - audit channel sizing

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::policy::{OperationPolicy, PolicyError};

pub const API_VERSION: &str = "opsdesk.io/v1";
pub const KIND: &str = "DeskConfig";

pub const ENV_CONFIG_PATH: &str = "OPSDESK_CONFIG_PATH";
pub const ENV_TASK_TIMEOUT_SECS: &str = "OPSDESK_TASK_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENCY: &str = "OPSDESK_MAX_CONCURRENCY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid apiVersion: '{0}'. Must be 'opsdesk.io/v1'")]
    InvalidApiVersion(String),

    #[error("Invalid kind: '{0}'. Must be 'DeskConfig'")]
    InvalidKind(String),

    #[error("metadata.name cannot be empty")]
    EmptyName,

    #[error("spec.coordinator.max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("spec.audit.channel_capacity must be at least 1")]
    InvalidChannelCapacity,

    #[error("Invalid policy table: {0}")]
    Policy(#[from] PolicyError),
}

/// Top-level desk configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// API version (must be "opsdesk.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DeskConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: DeskConfigSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeskConfigSpec {
    /// Operation policies. Empty selects the built-in table.
    #[serde(default)]
    pub policies: Vec<OperationPolicy>,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Deadline on each routed handler call.
    #[serde(default = "default_task_timeout", with = "humantime_serde")]
    pub task_timeout: Duration,

    /// Handler calls in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Silence longer than this counts as a decline.
    #[serde(default = "default_confirmation_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_concurrency() -> usize {
    8
}

fn default_confirmation_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            task_timeout: default_task_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout: default_confirmation_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "opsdesk".to_string(),
                version: Some("1.0.0".to_string()),
                labels: HashMap::new(),
            },
            spec: DeskConfigSpec::default(),
        }
    }
}

impl DeskConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. OPSDESK_CONFIG_PATH environment variable
    /// 2. ./opsdesk-config.yaml (working directory)
    /// 3. ~/.opsdesk/config.yaml (user home)
    /// 4. /etc/opsdesk/config.yaml (system, Unix) or C:\ProgramData\OpsDesk\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./opsdesk-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".opsdesk").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/opsdesk/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\OpsDesk\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    ///
    /// An explicit path must exist and parse.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overrides read through `lookup`; invalid values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(ENV_TASK_TIMEOUT_SECS) {
            match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    tracing::info!("Environment override: {}={}", ENV_TASK_TIMEOUT_SECS, secs);
                    self.spec.coordinator.task_timeout = Duration::from_secs(secs);
                }
                _ => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a positive integer. Ignoring.",
                    ENV_TASK_TIMEOUT_SECS,
                    val
                ),
            }
        }

        if let Some(val) = lookup(ENV_MAX_CONCURRENCY) {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: {}={}", ENV_MAX_CONCURRENCY, n);
                    self.spec.coordinator.max_concurrency = n;
                }
                _ => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a positive integer. Ignoring.",
                    ENV_MAX_CONCURRENCY,
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }
        if self.kind != KIND {
            return Err(ConfigError::InvalidKind(self.kind.clone()));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let coordinator = &self.spec.coordinator;
        if coordinator.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if coordinator.task_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("spec.coordinator.task_timeout"));
        }
        if self.spec.confirmation.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("spec.confirmation.timeout"));
        }
        if self.spec.audit.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }

        let mut names = HashSet::new();
        for policy in &self.spec.policies {
            policy.validate()?;
            if !names.insert(policy.name.as_str()) {
                return Err(PolicyError::DuplicatePolicy(policy.name.clone()).into());
            }
        }

        Ok(())
    }

    /// True when the manifest defers to the built-in policy table.
    pub fn uses_builtin_policies(&self) -> bool {
        self.spec.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::RiskLevel;
    use std::io::Write;

    const SAMPLE: &str = r#"
apiVersion: opsdesk.io/v1
kind: DeskConfig
metadata:
  name: helpdesk-eu
spec:
  policies:
    - name: ad.user.lookup
      required_roles: [viewer]
      min_risk_level: low
    - name: intune.device.wipe
      required_roles: [it_admin]
      min_risk_level: critical
      requires_approval: true
  coordinator:
    task_timeout: 30s
    max_concurrency: 2
  confirmation:
    timeout: 2m
"#;

    #[test]
    fn test_default_manifest() {
        let config = DeskConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert!(config.uses_builtin_policies());
        assert_eq!(config.spec.coordinator.task_timeout, Duration::from_secs(300));
        assert_eq!(config.spec.coordinator.max_concurrency, 8);
        assert_eq!(config.spec.audit.channel_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = DeskConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.metadata.name, "helpdesk-eu");
        assert_eq!(config.spec.policies.len(), 2);
        assert_eq!(config.spec.policies[1].min_risk_level, RiskLevel::Critical);
        assert!(config.spec.policies[1].requires_approval);
        assert!(!config.spec.policies[0].requires_approval);
        assert_eq!(config.spec.coordinator.task_timeout, Duration::from_secs(30));
        assert_eq!(config.spec.coordinator.max_concurrency, 2);
        assert_eq!(config.spec.confirmation.timeout, Duration::from_secs(120));
        // Omitted section falls back to defaults
        assert_eq!(config.spec.audit.channel_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DeskConfig::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.metadata.name, "helpdesk-eu");

        let out = tempfile::NamedTempFile::new().unwrap();
        config.to_yaml_file(out.path()).unwrap();
        let reloaded = DeskConfig::from_yaml_file(out.path()).unwrap();
        assert_eq!(reloaded.spec.policies, config.spec.policies);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = DeskConfig::load_or_default(Some(missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = DeskConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidApiVersion(_))));
        config.api_version = API_VERSION.to_string();

        config.kind = "NodeConfig".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidKind(_))));
        config.kind = KIND.to_string();

        config.spec.coordinator.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConcurrency)));
        config.spec.coordinator.max_concurrency = 4;

        config.spec.confirmation.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout(_))));
        config.spec.confirmation.timeout = Duration::from_secs(10);

        let lookup = OperationPolicy::new("ad.user.lookup", ["viewer"], RiskLevel::Low, false);
        config.spec.policies = vec![lookup.clone(), lookup];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Policy(PolicyError::DuplicatePolicy(_)))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DeskConfig::default();
        config.apply_overrides_from(|key| match key {
            ENV_TASK_TIMEOUT_SECS => Some("45".to_string()),
            ENV_MAX_CONCURRENCY => Some("zero".to_string()),
            _ => None,
        });
        assert_eq!(config.spec.coordinator.task_timeout, Duration::from_secs(45));
        // Unparseable value ignored
        assert_eq!(config.spec.coordinator.max_concurrency, 8);
    }
}
