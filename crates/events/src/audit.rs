//! In-memory append-only audit log of committed stock mutations.
//!
//! Every mutation the engine commits lands here as a JSON envelope with a
//! per-stream sequence number. A persistence collaborator would drain this
//! log into its durable store; tests use it to assert exactly what was
//! committed and in what order.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use wareflow_core::{AggregateId, TenantId};

use crate::envelope::EventEnvelope;
use crate::event::Event;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to serialize event payload: {0}")]
    Serialize(String),

    #[error("audit log lock poisoned")]
    Poisoned,
}

/// Per-stream key: one stream per (tenant, aggregate).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Append-only audit log with monotonic per-stream sequence numbers.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<Vec<EventEnvelope<JsonValue>>>,
    cursors: RwLock<HashMap<StreamKey, u64>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of typed events for one stream.
    ///
    /// Sequence numbers are assigned here (last + 1 per event). The batch is
    /// appended atomically with respect to other appends on the same log.
    pub fn append<E: Event + serde::Serialize>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        events: &[E],
    ) -> Result<Vec<EventEnvelope<JsonValue>>, AuditError> {
        let mut payloads = Vec::with_capacity(events.len());
        for event in events {
            let payload =
                serde_json::to_value(event).map_err(|e| AuditError::Serialize(e.to_string()))?;
            payloads.push(payload);
        }

        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut cursors = self.cursors.write().map_err(|_| AuditError::Poisoned)?;
        let mut entries = self.entries.write().map_err(|_| AuditError::Poisoned)?;

        let cursor = cursors.entry(key).or_insert(0);
        let mut appended = Vec::with_capacity(payloads.len());
        for payload in payloads {
            *cursor += 1;
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                tenant_id,
                aggregate_id,
                aggregate_type,
                *cursor,
                payload,
            );
            entries.push(envelope.clone());
            appended.push(envelope);
        }

        Ok(appended)
    }

    /// All envelopes for one tenant, in append order.
    pub fn for_tenant(&self, tenant_id: TenantId) -> Vec<EventEnvelope<JsonValue>> {
        match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.tenant_id() == tenant_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// All envelopes for one (tenant, aggregate) stream, in sequence order.
    pub fn for_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Vec<EventEnvelope<JsonValue>> {
        match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.tenant_id() == tenant_id && e.aggregate_id() == aggregate_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "test.ping"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    fn ping(n: u32) -> Ping {
        Ping {
            n,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic_per_stream() {
        let log = AuditLog::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        log.append(tenant, agg, "test", &[ping(1), ping(2)]).unwrap();
        log.append(tenant, agg, "test", &[ping(3)]).unwrap();

        let stream = log.for_stream(tenant, agg);
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn streams_are_isolated_by_tenant_and_aggregate() {
        let log = AuditLog::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let agg = AggregateId::new();

        log.append(tenant_a, agg, "test", &[ping(1)]).unwrap();
        log.append(tenant_b, agg, "test", &[ping(1)]).unwrap();

        assert_eq!(log.for_tenant(tenant_a).len(), 1);
        assert_eq!(log.for_tenant(tenant_b).len(), 1);
        assert_eq!(log.for_stream(tenant_b, agg)[0].sequence_number(), 1);
    }
}
