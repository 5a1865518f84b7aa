// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process wiring: config -> policy registry -> audited gate -> handlers ->
//! router -> coordinator.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use opsdesk_core::application::authorization::{AuthorizationGate, AuthorizationService, PolicyRegistry};
use opsdesk_core::application::router::IntentRouter;
use opsdesk_core::application::workflow_coordinator::WorkflowCoordinator;
use opsdesk_core::domain::audit::AuditRecord;
use opsdesk_core::domain::config::DeskConfig;
use opsdesk_core::infrastructure::audit::{
    AuditSink, ChannelAuditSink, CompositeAuditSink, InMemoryAuditSink, TracingAuditSink,
};
use opsdesk_core::infrastructure::event_bus::EventBus;

use crate::handlers;

pub struct Desk {
    pub config: DeskConfig,
    pub registry: Arc<PolicyRegistry>,
    pub auth: AuthorizationService,
    pub router: Arc<IntentRouter>,
    pub events: EventBus,
    /// Everything audited during this process, for display.
    pub audit_log: InMemoryAuditSink,
    audit: Arc<dyn AuditSink>,
    drain: AuditDrain,
}

/// Background task moving audit records from the channel to the writer.
struct AuditDrain {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AuditDrain {
    fn spawn(mut records: mpsc::Receiver<AuditRecord>, writer: Arc<dyn AuditSink>) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    record = records.recv() => match record {
                        Some(record) => writer.record(record),
                        None => return,
                    },
                    _ = &mut stopped => break,
                }
            }
            records.close();
            while let Some(record) = records.recv().await {
                writer.record(record);
            }
        });
        Self { stop, task }
    }
}

impl Desk {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = DeskConfig::load_or_default(config_path).context("Failed to load configuration")?;
        Self::from_config(config)
    }

    /// Must run inside a tokio runtime: the audit writer is a spawned task.
    pub fn from_config(config: DeskConfig) -> Result<Self> {
        Self::with_audit_writer(config, Arc::new(TracingAuditSink))
    }

    /// Audit records reach `writer` through a bounded channel; call
    /// [`Desk::shutdown`] before exiting so none are left in it.
    pub fn with_audit_writer(config: DeskConfig, writer: Arc<dyn AuditSink>) -> Result<Self> {
        let registry = Arc::new(PolicyRegistry::from_config(&config).context("Invalid policy configuration")?);

        let (channel, records) = ChannelAuditSink::new(config.spec.audit.channel_capacity);
        let drain = AuditDrain::spawn(records, writer);
        let audit_log = InMemoryAuditSink::new();
        let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(channel), Arc::new(audit_log.clone())];
        let audit: Arc<dyn AuditSink> = Arc::new(CompositeAuditSink::new(sinks));

        let auth = AuthorizationService::new(AuthorizationGate::new(Arc::clone(&registry)), Arc::clone(&audit));
        let router = IntentRouter::from_handlers(handlers::simulated(&auth)).context("Handler registration failed")?;

        Ok(Self {
            config,
            registry,
            auth,
            router: Arc::new(router),
            events: EventBus::with_default_capacity(),
            audit_log,
            audit,
            drain,
        })
    }

    /// Flushes the audit channel into the writer and waits for it.
    pub async fn shutdown(self) {
        let AuditDrain { stop, task } = self.drain;
        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!("Audit writer stopped abnormally: {}", e);
        }
    }

    pub fn coordinator(&self) -> WorkflowCoordinator {
        WorkflowCoordinator::from_config(Arc::clone(&self.router), &self.config.spec.coordinator)
            .with_event_bus(self.events.clone())
            .with_audit_sink(Arc::clone(&self.audit))
    }
}
