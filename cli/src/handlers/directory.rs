// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory handler: on-prem accounts plus the cloud identity surface
//! (licenses, groups, sign-in logs).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use opsdesk_core::application::authorization::AuthorizationService;
use opsdesk_core::domain::audit::{AuditEventType, AuditRecord};
use opsdesk_core::domain::handler::Handler;
use opsdesk_core::domain::request::{Request, Response, ResponseError};

use super::{guarded, normalize_user, not_found, unsupported};

const INTENTS: &[&str] = &[
    "ad.user.lookup",
    "ad.password.reset",
    "ad.account.unlock",
    "ad.laps.retrieve",
    "ad.bitlocker.retrieve",
    "graph.user.get",
    "graph.signin.list",
    "graph.license.assign",
    "graph.license.remove",
    "graph.group.add_member",
];

const DEFAULT_LICENSE: &str = "O365_E3";

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub department: String,
    pub enabled: bool,
    pub locked: bool,
    pub must_change_password: bool,
    pub password_last_set: DateTime<Utc>,
    pub licenses: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub computers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub at: DateTime<Utc>,
    pub application: String,
    pub status: String,
    pub ip_address: String,
}

#[derive(Default)]
struct DirectoryState {
    users: BTreeMap<String, UserAccount>,
    signins: BTreeMap<String, Vec<SignIn>>,
}

pub struct DirectoryHandler {
    auth: AuthorizationService,
    state: RwLock<DirectoryState>,
}

impl DirectoryHandler {
    pub fn new(auth: AuthorizationService) -> Self {
        Self {
            auth,
            state: RwLock::new(DirectoryState::default()),
        }
    }

    /// A small tenant: a locked finance user, an IT admin and a new hire.
    pub fn seeded(auth: AuthorizationService) -> Self {
        let handler = Self::new(auth);
        let now = Utc::now();
        handler.insert_user(
            UserAccount {
                username: "jdoe".to_string(),
                display_name: "Jane Doe".to_string(),
                email: "jdoe@contoso.com".to_string(),
                department: "Finance".to_string(),
                enabled: true,
                locked: true,
                must_change_password: false,
                password_last_set: now - Duration::days(97),
                licenses: [DEFAULT_LICENSE.to_string()].into(),
                groups: ["VPN-Users".to_string(), "Finance-Team".to_string()].into(),
                computers: vec!["FIN-LT-0042".to_string()],
            },
            vec![
                SignIn {
                    at: now - Duration::hours(3),
                    application: "Outlook".to_string(),
                    status: "failure: account locked".to_string(),
                    ip_address: "10.20.4.17".to_string(),
                },
                SignIn {
                    at: now - Duration::hours(4),
                    application: "Teams".to_string(),
                    status: "failure: invalid password".to_string(),
                    ip_address: "10.20.4.17".to_string(),
                },
            ],
        );
        handler.insert_user(
            UserAccount {
                username: "asmith".to_string(),
                display_name: "Alex Smith".to_string(),
                email: "asmith@contoso.com".to_string(),
                department: "IT".to_string(),
                enabled: true,
                locked: false,
                must_change_password: false,
                password_last_set: now - Duration::days(12),
                licenses: [DEFAULT_LICENSE.to_string(), "EMS_E5".to_string()].into(),
                groups: ["VPN-Users".to_string(), "IT-Team".to_string()].into(),
                computers: vec!["IT-LT-0001".to_string()],
            },
            vec![SignIn {
                at: now - Duration::minutes(20),
                application: "Azure Portal".to_string(),
                status: "success".to_string(),
                ip_address: "10.20.1.5".to_string(),
            }],
        );
        handler.insert_user(
            UserAccount {
                username: "mchen".to_string(),
                display_name: "Morgan Chen".to_string(),
                email: "mchen@contoso.com".to_string(),
                department: "Sales".to_string(),
                enabled: true,
                locked: false,
                must_change_password: true,
                password_last_set: now,
                licenses: BTreeSet::new(),
                groups: BTreeSet::new(),
                computers: Vec::new(),
            },
            Vec::new(),
        );
        handler
    }

    pub fn insert_user(&self, user: UserAccount, signins: Vec<SignIn>) {
        let mut state = self.state.write();
        state.signins.insert(user.username.clone(), signins);
        state.users.insert(user.username.clone(), user);
    }

    pub fn user(&self, username: &str) -> Option<UserAccount> {
        self.state.read().users.get(&normalize_user(username)).cloned()
    }

    fn audit(&self, event: AuditEventType, request: &Request, username: &str) {
        self.auth.record(
            AuditRecord::success(event, &request.context)
                .with_detail("target_user", username)
                .with_detail("intent", request.intent.as_str()),
        );
    }

    fn username(request: &Request) -> Result<String, ResponseError> {
        match request.param_str("username").or_else(|| request.param_str("user")) {
            Some(raw) if !raw.trim().is_empty() => Ok(normalize_user(raw)),
            _ => request.require_str("username").map(normalize_user),
        }
    }

    fn with_user<T>(&self, username: &str, f: impl FnOnce(&mut UserAccount) -> T) -> Result<T, ResponseError> {
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| not_found("USER_NOT_FOUND", "User", username))?;
        Ok(f(user))
    }

    fn lookup(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let user = self
            .user(&username)
            .ok_or_else(|| not_found("USER_NOT_FOUND", "User", &username))?;
        self.audit(AuditEventType::UserLookup, request, &username);
        Ok(json!({
            "display_name": user.display_name,
            "upn": user.email,
            "department": user.department,
            "enabled": user.enabled,
            "locked": user.locked,
            "password_last_set": user.password_last_set,
            "groups": user.groups,
            "licenses": user.licenses,
        }))
    }

    fn reset_password(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let must_change = request
            .parameters
            .get("must_change")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let temporary = request
            .param_str("temporary_password")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Tmp-{}!", &Uuid::new_v4().simple().to_string()[..10]));

        self.with_user(&username, |user| {
            user.password_last_set = Utc::now();
            user.must_change_password = must_change;
            user.locked = false;
        })?;
        self.audit(AuditEventType::PasswordReset, request, &username);

        Ok(json!({
            "username": username,
            "temporary_password": temporary,
            "must_change_at_next_logon": must_change,
        }))
    }

    fn unlock(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let was_locked = self.with_user(&username, |user| std::mem::replace(&mut user.locked, false))?;
        self.audit(AuditEventType::AccountUnlock, request, &username);
        Ok(json!({ "username": username, "was_locked": was_locked, "locked": false }))
    }

    fn laps(&self, request: &Request) -> Result<Value, ResponseError> {
        let computer = request.require_str("computer")?.to_ascii_uppercase();
        let known = self
            .state
            .read()
            .users
            .values()
            .any(|u| u.computers.contains(&computer));
        if !known {
            return Err(not_found("COMPUTER_NOT_FOUND", "Computer", &computer));
        }
        self.auth.record(
            AuditRecord::success(AuditEventType::LapsRetrieve, &request.context).with_detail("computer", computer.as_str()),
        );
        Ok(json!({
            "computer": computer,
            "password": format!("Laps-{}", &Uuid::new_v4().simple().to_string()[..12]),
            "expires_at": Utc::now() + Duration::hours(8),
        }))
    }

    fn bitlocker(&self, request: &Request) -> Result<Value, ResponseError> {
        let computer = request.require_str("computer")?.to_ascii_uppercase();
        let known = self
            .state
            .read()
            .users
            .values()
            .any(|u| u.computers.contains(&computer));
        if !known {
            return Err(not_found("COMPUTER_NOT_FOUND", "Computer", &computer));
        }
        self.auth.record(
            AuditRecord::success(AuditEventType::BitlockerRetrieve, &request.context)
                .with_detail("computer", computer.as_str()),
        );
        let digits = Uuid::new_v4().as_u128().to_string();
        let key: Vec<&str> = digits.as_bytes().chunks(6).filter_map(|c| std::str::from_utf8(c).ok()).collect();
        Ok(json!({ "computer": computer, "recovery_key": key.join("-") }))
    }

    fn signins(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let state = self.state.read();
        let user = state
            .users
            .get(&username)
            .ok_or_else(|| not_found("USER_NOT_FOUND", "User", &username))?;
        let events = state.signins.get(&username).cloned().unwrap_or_default();
        let failures = events.iter().filter(|s| s.status != "success").count();
        Ok(json!({
            "username": username,
            "locked": user.locked,
            "password_last_set": user.password_last_set,
            "recent_failures": failures,
            "signins": events,
        }))
    }

    fn assign_license(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let sku = request.param_str("sku").unwrap_or(DEFAULT_LICENSE).to_string();
        let added = self.with_user(&username, |user| user.licenses.insert(sku.clone()))?;
        self.auth.record(
            AuditRecord::success(AuditEventType::LicenseAssign, &request.context)
                .with_detail("target_user", username.as_str())
                .with_detail("sku", sku.as_str()),
        );
        Ok(json!({ "username": username, "sku": sku, "already_assigned": !added }))
    }

    fn remove_license(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let sku = request.param_str("sku").map(str::to_string);
        let removed: Vec<String> = self.with_user(&username, |user| match &sku {
            Some(sku) => user.licenses.take(sku).into_iter().collect(),
            None => std::mem::take(&mut user.licenses).into_iter().collect(),
        })?;
        self.auth.record(
            AuditRecord::success(AuditEventType::LicenseRemove, &request.context)
                .with_detail("target_user", username.as_str())
                .with_detail("removed", removed.clone()),
        );
        Ok(json!({ "username": username, "removed": removed }))
    }

    fn add_to_groups(&self, request: &Request) -> Result<Value, ResponseError> {
        let username = Self::username(request)?;
        let groups: Vec<String> = match request.parameters.get("groups") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            Some(Value::String(csv)) => csv.split(',').map(|g| g.trim().to_string()).filter(|g| !g.is_empty()).collect(),
            _ => vec![request.require_str("group")?.to_string()],
        };
        let added: Vec<String> = self.with_user(&username, |user| {
            groups.iter().filter(|g| user.groups.insert((*g).clone())).cloned().collect()
        })?;
        self.auth.record(
            AuditRecord::success(AuditEventType::GroupAdd, &request.context)
                .with_detail("target_user", username.as_str())
                .with_detail("groups", groups.clone()),
        );
        Ok(json!({ "username": username, "groups": groups, "added": added }))
    }
}

#[async_trait]
impl Handler for DirectoryHandler {
    fn name(&self) -> &str {
        "directory"
    }

    fn supported_intents(&self) -> Vec<String> {
        INTENTS.iter().map(|s| s.to_string()).collect()
    }

    async fn handle(&self, request: Request) -> Response {
        guarded(&self.auth, &request, || match request.intent.as_str() {
            "ad.user.lookup" | "graph.user.get" => self.lookup(&request),
            "ad.password.reset" => self.reset_password(&request),
            "ad.account.unlock" => self.unlock(&request),
            "ad.laps.retrieve" => self.laps(&request),
            "ad.bitlocker.retrieve" => self.bitlocker(&request),
            "graph.signin.list" => self.signins(&request),
            "graph.license.assign" => self.assign_license(&request),
            "graph.license.remove" => self.remove_license(&request),
            "graph.group.add_member" => self.add_to_groups(&request),
            _ => Err(unsupported(self.name(), &request, self.supported_intents())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_core::application::authorization::{AuthorizationGate, PolicyRegistry};
    use opsdesk_core::domain::policy::{Principal, RiskLevel};
    use opsdesk_core::domain::request::{ErrorCode, RequestContext, RequestSource};
    use opsdesk_core::infrastructure::audit::InMemoryAuditSink;
    use std::sync::Arc;

    fn handler() -> (DirectoryHandler, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::new();
        let gate = AuthorizationGate::new(Arc::new(PolicyRegistry::builtin()));
        let auth = AuthorizationService::new(gate, Arc::new(sink.clone()));
        (DirectoryHandler::seeded(auth), sink)
    }

    fn request(intent: &str, roles: &[&str], risk: RiskLevel, approved: bool) -> Request {
        let mut ctx = RequestContext::new(Principal::new("tech1", roles.iter().copied()), RequestSource::Cli, risk);
        if approved {
            ctx = ctx.with_approval("lead1");
        }
        Request::new(intent, ctx)
    }

    #[tokio::test]
    async fn test_reset_unlocks_and_forces_change() {
        let (handler, sink) = handler();
        let req = request("ad.password.reset", &["it_helpdesk"], RiskLevel::Medium, true)
            .with_param("username", "JDoe@contoso.com");

        let response = handler.handle(req).await;
        assert!(response.success, "{:?}", response.error);

        let user = handler.user("jdoe").unwrap();
        assert!(!user.locked);
        assert!(user.must_change_password);

        let events: Vec<_> = sink.records().iter().map(|r| r.event_type).collect();
        assert_eq!(events, vec![AuditEventType::AuthSuccess, AuditEventType::PasswordReset]);
    }

    #[tokio::test]
    async fn test_denied_reset_changes_nothing() {
        let (handler, sink) = handler();
        let req = request("ad.password.reset", &["viewer"], RiskLevel::Medium, true).with_param("username", "jdoe");

        let response = handler.handle(req).await;
        assert_eq!(response.error_code(), Some(&ErrorCode::InsufficientRoles));
        assert!(handler.user("jdoe").unwrap().locked);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (handler, _) = handler();
        let req = request("ad.user.lookup", &["viewer"], RiskLevel::Low, false).with_param("username", "ghost");
        let response = handler.handle(req).await;
        assert_eq!(response.error_code().map(|c| c.as_str()), Some("USER_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_license_and_group_changes() {
        let (handler, _) = handler();
        let assign = request("graph.license.assign", &["it_admin"], RiskLevel::Medium, true).with_param("username", "mchen");
        assert!(handler.handle(assign).await.success);

        let groups = request("graph.group.add_member", &["it_admin"], RiskLevel::Medium, true)
            .with_param("username", "mchen")
            .with_param("groups", json!(["VPN-Users", "Sales-Team"]));
        assert!(handler.handle(groups).await.success);

        let user = handler.user("mchen").unwrap();
        assert!(user.licenses.contains(DEFAULT_LICENSE));
        assert!(user.groups.contains("Sales-Team"));

        let remove = request("graph.license.remove", &["it_admin"], RiskLevel::Medium, true).with_param("username", "mchen");
        let response = handler.handle(remove).await;
        assert_eq!(response.data.unwrap()["removed"], json!([DEFAULT_LICENSE]));
        assert!(handler.user("mchen").unwrap().licenses.is_empty());
    }

    #[tokio::test]
    async fn test_signins_report_failures() {
        let (handler, _) = handler();
        let req = request("graph.signin.list", &["viewer"], RiskLevel::Low, false).with_param("user", "jdoe");
        let data = handler.handle(req).await.data.unwrap();
        assert_eq!(data["recent_failures"], 2);
    }
}
