use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use super::ledger::AuditLedger;
use super::record::{AuditError, AuditEvent, NewAuditEvent, PartitionKey};

pub const REDACTED: &str = "[REDACTED]";

/// Writes audit events through the optimistic append protocol.
///
/// Reads the tail, appends against it, and on `ChainIntegrity` re-reads the
/// tail and tries again, up to `max_attempts`. Snapshot fields named in
/// `redacted_fields` are replaced before hashing, at any depth.
#[derive(Clone)]
pub struct AuditWriter {
    ledger: Arc<dyn AuditLedger>,
    redacted_fields: Vec<String>,
    max_attempts: u32,
}

impl AuditWriter {
    pub fn new(ledger: Arc<dyn AuditLedger>) -> Self {
        Self {
            ledger,
            redacted_fields: vec!["bank_account".to_string(), "vendor_tax_id".to_string()],
            max_attempts: 16,
        }
    }

    pub fn with_redacted_fields(mut self, fields: Vec<String>) -> Self {
        self.redacted_fields = fields;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }

    pub fn record(
        &self,
        partition: &PartitionKey,
        mut event: NewAuditEvent,
    ) -> Result<AuditEvent, AuditError> {
        redact(&mut event.before, &self.redacted_fields);
        redact(&mut event.after, &self.redacted_fields);

        let mut attempt = 1;
        loop {
            let tail = self.ledger.tail(partition)?;
            match self.ledger.append(partition, event.clone(), &tail.hash) {
                Err(AuditError::ChainIntegrity { .. }) if attempt < self.max_attempts => {
                    warn!(
                        partition = %partition,
                        attempt,
                        "audit tail moved during append; retrying with fresh tail"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn redact(value: &mut JsonValue, fields: &[String]) {
    match value {
        JsonValue::Object(map) => {
            for (key, v) in map.iter_mut() {
                if fields.iter().any(|f| f == key) {
                    if !v.is_null() {
                        *v = JsonValue::String(REDACTED.to_string());
                    }
                } else {
                    redact(v, fields);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(|v| redact(v, fields)),
        _ => {}
    }
}
