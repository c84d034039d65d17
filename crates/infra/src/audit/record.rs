use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use invoiceflow_core::{AuditEventId, TenantId};

/// Identifies one hash chain. Chains are per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self(format!("tenant:{tenant_id}"))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An audit record before it is placed on a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub actor: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub before: JsonValue,
    pub after: JsonValue,
    pub reason: Option<String>,
    /// Earlier event this one corrects or follows up on.
    pub references: Option<AuditEventId>,
}

impl NewAuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        actor: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
        action: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            occurred_at,
            event_type: event_type.into(),
            actor: actor.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            action: action.into(),
            before: JsonValue::Null,
            after: JsonValue::Null,
            reason: None,
            references: None,
        }
    }

    pub fn with_states(mut self, before: JsonValue, after: JsonValue) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_optional_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn referencing(mut self, event_id: AuditEventId) -> Self {
        self.references = Some(event_id);
        self
    }
}

/// A committed, hash-linked audit record. Never edited after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: AuditEventId,
    pub partition: PartitionKey,
    /// 1-based position in the partition chain.
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub actor: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub before: JsonValue,
    pub after: JsonValue,
    pub reason: Option<String>,
    pub references: Option<AuditEventId>,
    pub prev_hash: String,
    pub hash: String,
}

/// Current end of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    pub sequence: u64,
    pub hash: String,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub partition: PartitionKey,
    pub from_sequence: u64,
    pub to_sequence: u64,
    pub events_checked: u64,
    /// Hash of the last verified event (the anchor hash for an empty range).
    pub tail_hash: String,
}

#[derive(Debug, Error)]
pub enum AuditError {
    /// The caller's view of the tail is stale; re-read the tail and retry.
    #[error("chain integrity conflict on {partition}: expected previous hash {expected}, tail is {actual}")]
    ChainIntegrity {
        partition: PartitionKey,
        expected: String,
        actual: String,
    },

    #[error("tamper detected on {partition} at sequence {sequence}: {reason}")]
    TamperDetected {
        partition: PartitionKey,
        sequence: u64,
        reason: String,
    },

    #[error("partition {0} is halted pending investigation")]
    PartitionHalted(PartitionKey),

    #[error("audit journal failure: {0}")]
    Journal(#[from] std::io::Error),

    #[error("audit serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("audit storage failure: {0}")]
    Storage(String),
}
