// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit Sinks - write-only destinations for AuditRecords
//
// Recording is synchronous and must never block the caller or fail the
// operation being audited. Durable storage is owned by whatever consumes the
// channel sink. In-process sinks:
// - TracingAuditSink: structured log lines under target `opsdesk::audit`
// - InMemoryAuditSink: append-only buffer, used by tests and the CLI
// - ChannelAuditSink: bounded mpsc hand-off to a background writer
// - CompositeAuditSink: fan-out to several of the above

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::audit::{AuditOutcome, AuditRecord};

pub const AUDIT_TARGET: &str = "opsdesk::audit";

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Best-effort, non-blocking.
    fn record(&self, record: AuditRecord);
}

/// Emits every record as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        let details = serde_json::Value::Object(record.details.clone());
        if record.outcome == AuditOutcome::Success {
            info!(
                target: AUDIT_TARGET,
                event_type = %record.event_type,
                outcome = %record.outcome,
                principal_id = %record.principal_id,
                correlation_id = %record.correlation_id,
                source = %record.source,
                risk_level = %record.risk_level,
                approval_granted = record.approval_granted,
                approver_id = record.approver_id.as_deref().unwrap_or(""),
                details = %details,
                "audit"
            );
        } else {
            warn!(
                target: AUDIT_TARGET,
                event_type = %record.event_type,
                outcome = %record.outcome,
                principal_id = %record.principal_id,
                correlation_id = %record.correlation_id,
                source = %record.source,
                risk_level = %record.risk_level,
                approval_granted = record.approval_granted,
                approver_id = record.approver_id.as_deref().unwrap_or(""),
                details = %details,
                error = record.error_message.as_deref().unwrap_or(""),
                "audit"
            );
        }
    }
}

/// Append-only in-process buffer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.write().push(record);
    }
}

/// Hands records to a background consumer over a bounded channel.
///
/// A full or closed channel drops the record with a warning instead of
/// waiting.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditRecord>,
}

impl ChannelAuditSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.sender.try_send(record) {
            let (reason, record) = match e {
                mpsc::error::TrySendError::Full(r) => ("full", r),
                mpsc::error::TrySendError::Closed(r) => ("closed", r),
            };
            warn!(
                target: AUDIT_TARGET,
                reason,
                event_type = %record.event_type,
                correlation_id = %record.correlation_id,
                "Audit channel unavailable, record dropped"
            );
        }
    }
}

/// Fans one record out to several sinks.
#[derive(Clone, Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(record.clone());
            }
            last.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditEventType;
    use crate::domain::policy::{Principal, RiskLevel};
    use crate::domain::request::{RequestContext, RequestSource};

    fn record(event: AuditEventType) -> AuditRecord {
        let ctx = RequestContext::new(Principal::new("tech1", ["it_helpdesk"]), RequestSource::Cli, RiskLevel::Low);
        AuditRecord::success(event, &ctx)
    }

    #[test]
    fn test_in_memory_sink_keeps_order() {
        let sink = InMemoryAuditSink::new();
        sink.record(record(AuditEventType::AuthSuccess));
        sink.record(record(AuditEventType::PasswordReset));

        let events: Vec<_> = sink.records().iter().map(|r| r.event_type).collect();
        assert_eq!(events, vec![AuditEventType::AuthSuccess, AuditEventType::PasswordReset]);
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut receiver) = ChannelAuditSink::new(1);
        sink.record(record(AuditEventType::AuthSuccess));
        // Second record does not fit and must not block
        sink.record(record(AuditEventType::AuthDenied));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event_type, AuditEventType::AuthSuccess);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_composite_sink_fans_out() {
        let a = InMemoryAuditSink::new();
        let b = InMemoryAuditSink::new();
        let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(a.clone()), Arc::new(b.clone()), Arc::new(TracingAuditSink)];
        let composite = CompositeAuditSink::new(sinks);
        composite.record(record(AuditEventType::DeviceSync));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
