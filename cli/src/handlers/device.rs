// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Device-management handler: inventory, compliance and remote actions.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use opsdesk_core::application::authorization::AuthorizationService;
use opsdesk_core::domain::audit::{AuditEventType, AuditRecord};
use opsdesk_core::domain::handler::Handler;
use opsdesk_core::domain::request::{ErrorCode, Request, Response, ResponseError};

use super::{guarded, normalize_user, not_found, unsupported};

const INTENTS: &[&str] = &[
    "intune.device.get",
    "intune.device.list",
    "intune.device.compliance",
    "intune.device.sync",
    "intune.device.restart",
    "intune.device.wipe",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    Compliant,
    NonCompliant,
    Retired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagedDevice {
    pub name: String,
    pub owner: String,
    pub os: String,
    pub compliance: ComplianceState,
    /// Settings the last evaluation flagged; a sync re-evaluates them.
    pub issues: Vec<String>,
    pub last_sync: DateTime<Utc>,
    pub restarts: u32,
}

pub struct DeviceHandler {
    auth: AuthorizationService,
    devices: RwLock<BTreeMap<String, ManagedDevice>>,
}

impl DeviceHandler {
    pub fn new(auth: AuthorizationService) -> Self {
        Self {
            auth,
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn seeded(auth: AuthorizationService) -> Self {
        let handler = Self::new(auth);
        let now = Utc::now();
        for (name, owner, os, issues, stale_days) in [
            ("FIN-LT-0042", "jdoe", "Windows 11 23H2", vec!["Defender signatures out of date"], 9),
            ("FIN-PH-0107", "jdoe", "iOS 17.5", vec![], 1),
            ("IT-LT-0001", "asmith", "Windows 11 23H2", vec![], 0),
        ] {
            handler.insert(ManagedDevice {
                name: name.to_string(),
                owner: owner.to_string(),
                os: os.to_string(),
                compliance: if issues.is_empty() {
                    ComplianceState::Compliant
                } else {
                    ComplianceState::NonCompliant
                },
                issues: issues.into_iter().map(str::to_string).collect(),
                last_sync: now - Duration::days(stale_days),
                restarts: 0,
            });
        }
        handler
    }

    pub fn insert(&self, device: ManagedDevice) {
        self.devices.write().insert(device.name.clone(), device);
    }

    pub fn device(&self, name: &str) -> Option<ManagedDevice> {
        self.devices.read().get(&name.to_ascii_uppercase()).cloned()
    }

    fn device_name(request: &Request) -> Result<String, ResponseError> {
        Ok(request.require_str("device")?.trim().to_ascii_uppercase())
    }

    fn with_device<T>(&self, name: &str, f: impl FnOnce(&mut ManagedDevice) -> T) -> Result<T, ResponseError> {
        let mut devices = self.devices.write();
        Ok(f(active(&mut devices, name)?))
    }

    fn audit(&self, event: AuditEventType, request: &Request, devices: &[String]) {
        self.auth.record(
            AuditRecord::success(event, &request.context)
                .with_detail("devices", devices.to_vec())
                .with_detail("intent", request.intent.as_str()),
        );
    }

    fn get(&self, request: &Request) -> Result<Value, ResponseError> {
        let name = Self::device_name(request)?;
        let device = self
            .device(&name)
            .ok_or_else(|| not_found("DEVICE_NOT_FOUND", "Device", &name))?;
        serde_json::to_value(device).map_err(|e| ResponseError::new("SERIALIZATION_ERROR", e.to_string()))
    }

    fn list(&self, request: &Request) -> Result<Value, ResponseError> {
        let owner = request.param_str("user").map(normalize_user);
        let devices: Vec<ManagedDevice> = self
            .devices
            .read()
            .values()
            .filter(|d| owner.as_deref().map_or(true, |o| d.owner == o))
            .cloned()
            .collect();
        Ok(json!({ "user": owner, "count": devices.len(), "devices": devices }))
    }

    fn compliance(&self, request: &Request) -> Result<Value, ResponseError> {
        let name = Self::device_name(request)?;
        let device = self
            .device(&name)
            .ok_or_else(|| not_found("DEVICE_NOT_FOUND", "Device", &name))?;
        Ok(json!({
            "device": device.name,
            "compliance_state": device.compliance,
            "issues": device.issues,
            "last_sync": device.last_sync,
        }))
    }

    fn sync(&self, request: &Request) -> Result<Value, ResponseError> {
        let name = Self::device_name(request)?;
        let resolved = self.with_device(&name, |device| {
            device.last_sync = Utc::now();
            let resolved = std::mem::take(&mut device.issues);
            device.compliance = ComplianceState::Compliant;
            resolved
        })?;
        self.audit(AuditEventType::DeviceSync, request, std::slice::from_ref(&name));
        Ok(json!({ "device": name, "synced": true, "resolved_issues": resolved }))
    }

    fn restart(&self, request: &Request) -> Result<Value, ResponseError> {
        let name = Self::device_name(request)?;
        let restarts = self.with_device(&name, |device| {
            device.restarts += 1;
            device.restarts
        })?;
        self.audit(AuditEventType::DeviceRestart, request, std::slice::from_ref(&name));
        Ok(json!({ "device": name, "restart_queued": true, "restarts": restarts }))
    }

    /// Wipes one device, or every active device of `user`. Targets are
    /// chosen and retired under one write lock; either all are wiped or none.
    fn wipe(&self, request: &Request) -> Result<Value, ResponseError> {
        let mut devices = self.devices.write();
        let targets: Vec<String> = if let Some(user) = request.param_str("user") {
            let owner = normalize_user(user);
            devices
                .values()
                .filter(|d| d.owner == owner && d.compliance != ComplianceState::Retired)
                .map(|d| d.name.clone())
                .collect()
        } else if request.param_str("device").is_some() {
            vec![Self::device_name(request)?]
        } else {
            return Err(ResponseError::new(
                ErrorCode::InvalidInput,
                "'device' or 'user' parameter required for intent 'intune.device.wipe'",
            ));
        };

        for name in &targets {
            active(&mut devices, name)?;
        }
        for name in &targets {
            let device = active(&mut devices, name)?;
            device.compliance = ComplianceState::Retired;
            device.issues.clear();
        }
        drop(devices);

        self.audit(AuditEventType::DeviceWipe, request, &targets);
        Ok(json!({ "wiped": targets, "count": targets.len() }))
    }
}

fn active<'a>(
    devices: &'a mut BTreeMap<String, ManagedDevice>,
    name: &str,
) -> Result<&'a mut ManagedDevice, ResponseError> {
    let device = devices
        .get_mut(name)
        .ok_or_else(|| not_found("DEVICE_NOT_FOUND", "Device", name))?;
    if device.compliance == ComplianceState::Retired {
        return Err(ResponseError::new("DEVICE_RETIRED", format!("Device '{}' has been wiped", name)).with_detail("id", name));
    }
    Ok(device)
}

#[async_trait]
impl Handler for DeviceHandler {
    fn name(&self) -> &str {
        "device"
    }

    fn supported_intents(&self) -> Vec<String> {
        INTENTS.iter().map(|s| s.to_string()).collect()
    }

    async fn handle(&self, request: Request) -> Response {
        guarded(&self.auth, &request, || match request.intent.as_str() {
            "intune.device.get" => self.get(&request),
            "intune.device.list" => self.list(&request),
            "intune.device.compliance" => self.compliance(&request),
            "intune.device.sync" => self.sync(&request),
            "intune.device.restart" => self.restart(&request),
            "intune.device.wipe" => self.wipe(&request),
            _ => Err(unsupported(self.name(), &request, self.supported_intents())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_core::application::authorization::{AuthorizationGate, PolicyRegistry};
    use opsdesk_core::domain::policy::{Principal, RiskLevel};
    use opsdesk_core::domain::request::{RequestContext, RequestSource};
    use opsdesk_core::infrastructure::audit::InMemoryAuditSink;
    use std::sync::Arc;

    fn handler() -> DeviceHandler {
        let gate = AuthorizationGate::new(Arc::new(PolicyRegistry::builtin()));
        DeviceHandler::seeded(AuthorizationService::new(gate, Arc::new(InMemoryAuditSink::new())))
    }

    fn admin(intent: &str, risk: RiskLevel) -> Request {
        let ctx = RequestContext::new(Principal::new("admin1", ["it_admin"]), RequestSource::Cli, risk).with_approval("admin1");
        Request::new(intent, ctx)
    }

    #[tokio::test]
    async fn test_sync_fixes_compliance() {
        let handler = handler();
        let before = handler
            .handle(admin("intune.device.compliance", RiskLevel::Low).with_param("device", "fin-lt-0042"))
            .await;
        assert_eq!(before.data.unwrap()["compliance_state"], "non_compliant");

        let sync = handler
            .handle(admin("intune.device.sync", RiskLevel::Low).with_param("device", "FIN-LT-0042"))
            .await;
        assert!(sync.success);
        assert_eq!(handler.device("FIN-LT-0042").unwrap().compliance, ComplianceState::Compliant);
    }

    #[tokio::test]
    async fn test_wipe_all_user_devices_needs_critical_risk() {
        let handler = handler();
        let low = handler
            .handle(admin("intune.device.wipe", RiskLevel::High).with_param("user", "jdoe"))
            .await;
        assert_eq!(low.error_code(), Some(&ErrorCode::InsufficientRiskLevel));

        let wipe = handler
            .handle(admin("intune.device.wipe", RiskLevel::Critical).with_param("user", "jdoe@contoso.com"))
            .await;
        assert_eq!(wipe.data.unwrap()["count"], 2);
        assert_eq!(handler.device("FIN-PH-0107").unwrap().compliance, ComplianceState::Retired);
        assert_eq!(handler.device("IT-LT-0001").unwrap().compliance, ComplianceState::Compliant);

        let restart = handler
            .handle(admin("intune.device.restart", RiskLevel::Medium).with_param("device", "FIN-PH-0107"))
            .await;
        assert_eq!(restart.error_code().map(|c| c.as_str()), Some("DEVICE_RETIRED"));
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let handler = handler();
        let response = handler
            .handle(admin("intune.device.list", RiskLevel::Low).with_param("user", "asmith"))
            .await;
        assert_eq!(response.data.unwrap()["count"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_user_wipes_retire_each_device_once() {
        let handler = Arc::new(handler());
        let mut wipes = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            wipes.push(tokio::spawn(async move {
                handler
                    .handle(admin("intune.device.wipe", RiskLevel::Critical).with_param("user", "jdoe"))
                    .await
            }));
        }

        let mut counts = Vec::new();
        for wipe in wipes {
            let response = wipe.await.unwrap();
            assert!(response.success, "wipe failed: {:?}", response.error);
            counts.push(response.data.unwrap()["count"].as_u64().unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, vec![0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[tokio::test]
    async fn test_wipe_of_retired_device_changes_nothing() {
        let handler = handler();
        handler.insert(ManagedDevice {
            name: "OLD-LT-0001".to_string(),
            owner: "jdoe".to_string(),
            os: "Windows 10".to_string(),
            compliance: ComplianceState::Retired,
            issues: vec![],
            last_sync: Utc::now(),
            restarts: 0,
        });

        let wipe = handler
            .handle(admin("intune.device.wipe", RiskLevel::Critical).with_param("device", "old-lt-0001"))
            .await;
        assert_eq!(wipe.error_code().map(|c| c.as_str()), Some("DEVICE_RETIRED"));
        assert_eq!(handler.device("FIN-PH-0107").unwrap().compliance, ComplianceState::Compliant);
    }
}
