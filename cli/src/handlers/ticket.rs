// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ticketing handler: incident search, creation and resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use opsdesk_core::application::authorization::AuthorizationService;
use opsdesk_core::domain::audit::{AuditEventType, AuditRecord};
use opsdesk_core::domain::handler::Handler;
use opsdesk_core::domain::request::{Request, Response, ResponseError};

use super::{guarded, not_found, unsupported};

const INTENTS: &[&str] = &[
    "servicenow.incident.search",
    "servicenow.incident.create",
    "servicenow.incident.resolve",
];

const FIRST_NUMBER: u64 = 10_001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    New,
    Resolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub number: String,
    pub short_description: String,
    pub description: String,
    pub caller: String,
    pub category: String,
    pub state: IncidentState,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

struct Ledger {
    next: u64,
    incidents: BTreeMap<String, Incident>,
}

pub struct TicketHandler {
    auth: AuthorizationService,
    ledger: RwLock<Ledger>,
}

impl TicketHandler {
    pub fn new(auth: AuthorizationService) -> Self {
        Self {
            auth,
            ledger: RwLock::new(Ledger {
                next: FIRST_NUMBER,
                incidents: BTreeMap::new(),
            }),
        }
    }

    pub fn incident(&self, number: &str) -> Option<Incident> {
        self.ledger.read().incidents.get(number).cloned()
    }

    fn search(&self, request: &Request) -> Result<Value, ResponseError> {
        let query = request.param_str("query").unwrap_or_default().to_ascii_lowercase();
        let matches: Vec<Incident> = self
            .ledger
            .read()
            .incidents
            .values()
            .filter(|i| {
                query.is_empty()
                    || i.short_description.to_ascii_lowercase().contains(&query)
                    || i.caller.to_ascii_lowercase().contains(&query)
                    || i.number.to_ascii_lowercase() == query
            })
            .cloned()
            .collect();
        Ok(json!({ "count": matches.len(), "incidents": matches }))
    }

    fn create(&self, request: &Request) -> Result<Value, ResponseError> {
        let short_description = request.require_str("short_description")?.to_string();
        let incident = {
            let mut ledger = self.ledger.write();
            let number = format!("INC{:07}", ledger.next);
            ledger.next += 1;
            let incident = Incident {
                number: number.clone(),
                description: request.param_str("description").unwrap_or(&short_description).to_string(),
                short_description,
                caller: request
                    .param_str("caller")
                    .unwrap_or(request.context.principal_id())
                    .to_string(),
                category: request.param_str("category").unwrap_or("inquiry").to_string(),
                state: IncidentState::New,
                opened_by: request.context.principal_id().to_string(),
                opened_at: Utc::now(),
                resolved_at: None,
                resolution_notes: None,
            };
            ledger.incidents.insert(number, incident.clone());
            incident
        };

        self.auth.record(
            AuditRecord::success(AuditEventType::IncidentCreate, &request.context)
                .with_detail("number", incident.number.as_str())
                .with_detail("caller", incident.caller.as_str()),
        );
        Ok(json!({ "number": incident.number, "state": incident.state }))
    }

    fn resolve(&self, request: &Request) -> Result<Value, ResponseError> {
        let number = request.require_str("number")?.to_ascii_uppercase();
        let notes = request.require_str("resolution_notes")?.to_string();
        {
            let mut ledger = self.ledger.write();
            let incident = ledger
                .incidents
                .get_mut(&number)
                .ok_or_else(|| not_found("INCIDENT_NOT_FOUND", "Incident", &number))?;
            if incident.state == IncidentState::Resolved {
                return Err(ResponseError::new(
                    "INCIDENT_ALREADY_RESOLVED",
                    format!("Incident '{}' is already resolved", number),
                ));
            }
            incident.state = IncidentState::Resolved;
            incident.resolved_at = Some(Utc::now());
            incident.resolution_notes = Some(notes);
        }

        self.auth.record(
            AuditRecord::success(AuditEventType::IncidentResolve, &request.context).with_detail("number", number.as_str()),
        );
        Ok(json!({ "number": number, "state": IncidentState::Resolved }))
    }
}

#[async_trait]
impl Handler for TicketHandler {
    fn name(&self) -> &str {
        "ticket"
    }

    fn supported_intents(&self) -> Vec<String> {
        INTENTS.iter().map(|s| s.to_string()).collect()
    }

    async fn handle(&self, request: Request) -> Response {
        guarded(&self.auth, &request, || match request.intent.as_str() {
            "servicenow.incident.search" => self.search(&request),
            "servicenow.incident.create" => self.create(&request),
            "servicenow.incident.resolve" => self.resolve(&request),
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

    fn handler() -> TicketHandler {
        let gate = AuthorizationGate::new(Arc::new(PolicyRegistry::builtin()));
        TicketHandler::new(AuthorizationService::new(gate, Arc::new(InMemoryAuditSink::new())))
    }

    fn request(intent: &str) -> Request {
        let ctx = RequestContext::new(Principal::new("tech1", ["it_helpdesk"]), RequestSource::Cli, RiskLevel::Low);
        Request::new(intent, ctx)
    }

    #[tokio::test]
    async fn test_incident_lifecycle() {
        let handler = handler();

        let created = handler
            .handle(request("servicenow.incident.create").with_param("short_description", "Password reset for jdoe"))
            .await;
        let number = created.data.unwrap()["number"].as_str().unwrap().to_string();
        assert_eq!(number, "INC0010001");
        assert_eq!(handler.incident(&number).unwrap().caller, "tech1");

        let found = handler
            .handle(request("servicenow.incident.search").with_param("query", "jdoe"))
            .await;
        assert_eq!(found.data.unwrap()["count"], 1);

        let resolve = || {
            request("servicenow.incident.resolve")
                .with_param("number", number.as_str())
                .with_param("resolution_notes", "Reset and verified")
        };
        assert!(handler.handle(resolve()).await.success);
        let again = handler.handle(resolve()).await;
        assert_eq!(again.error_code().map(|c| c.as_str()), Some("INCIDENT_ALREADY_RESOLVED"));
    }

    #[tokio::test]
    async fn test_create_requires_description() {
        let response = handler().handle(request("servicenow.incident.create")).await;
        assert_eq!(response.error_code().map(|c| c.as_str()), Some("INVALID_INPUT"));
    }
}
