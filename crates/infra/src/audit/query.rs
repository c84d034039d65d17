//! Read-only audit queries for inspection and compliance export.
//!
//! Queries never mutate the ledger. `AuditCursor` pulls events lazily in
//! batches and can be resumed from any sequence number.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::AuditLedger;
use super::record::{AuditError, AuditEvent, PartitionKey};

const CURSOR_BATCH: usize = 256;

/// Pagination parameters for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of events to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Exact event type, e.g. `invoicing.invoice.approved`.
    pub event_type: Option<String>,
    pub actor: Option<String>,
    /// Inclusive lower bound.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub occurred_before: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn for_resource(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: Some(resource_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        eq(&self.resource_type, &event.resource_type)
            && eq(&self.resource_id, &event.resource_id)
            && eq(&self.event_type, &event.event_type)
            && eq(&self.actor, &event.actor)
            && self.occurred_after.is_none_or(|t| event.occurred_at >= t)
            && self.occurred_before.is_none_or(|t| event.occurred_at < t)
    }
}

/// Paginated query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueryResult {
    pub events: Vec<AuditEvent>,
    /// Total number of events matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Lazy, restartable iterator over one partition in chain order.
pub struct AuditCursor<'a> {
    ledger: &'a dyn AuditLedger,
    partition: PartitionKey,
    filter: AuditFilter,
    /// Last sequence pulled from the ledger.
    fetched: u64,
    /// Last sequence handed to the caller.
    position: u64,
    buffer: VecDeque<AuditEvent>,
    done: bool,
}

impl<'a> AuditCursor<'a> {
    pub fn new(ledger: &'a dyn AuditLedger, partition: PartitionKey, filter: AuditFilter) -> Self {
        Self::resume(ledger, partition, filter, 0)
    }

    /// Continue after `sequence` (the last position a previous cursor reported).
    pub fn resume(
        ledger: &'a dyn AuditLedger,
        partition: PartitionKey,
        filter: AuditFilter,
        sequence: u64,
    ) -> Self {
        Self {
            ledger,
            partition,
            filter,
            fetched: sequence,
            position: sequence,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Sequence number of the last event yielded; pass it to `resume`.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn fill(&mut self) -> Result<(), AuditError> {
        while self.buffer.is_empty() && !self.done {
            let batch = self.ledger.read(&self.partition, self.fetched, CURSOR_BATCH)?;
            if batch.len() < CURSOR_BATCH {
                self.done = true;
            }
            if let Some(last) = batch.last() {
                self.fetched = last.sequence;
            }
            self.buffer
                .extend(batch.into_iter().filter(|e| self.filter.matches(e)));
        }
        Ok(())
    }
}

impl Iterator for AuditCursor<'_> {
    type Item = Result<AuditEvent, AuditError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.fill() {
            self.done = true;
            self.buffer.clear();
            return Some(Err(err));
        }
        let event = self.buffer.pop_front()?;
        self.position = event.sequence;
        Some(Ok(event))
    }
}

/// Filtered, paginated page of a partition, oldest first.
pub fn query(
    ledger: &dyn AuditLedger,
    partition: &PartitionKey,
    filter: &AuditFilter,
    pagination: Pagination,
) -> Result<AuditQueryResult, AuditError> {
    let pagination = Pagination::new(Some(pagination.limit), Some(pagination.offset));
    let offset = pagination.offset as u64;
    let limit = pagination.limit as u64;

    let mut total = 0u64;
    let mut events = Vec::with_capacity(pagination.limit as usize);
    for event in AuditCursor::new(ledger, partition.clone(), filter.clone()) {
        let event = event?;
        if total >= offset && total < offset + limit {
            events.push(event);
        }
        total += 1;
    }

    Ok(AuditQueryResult {
        has_more: offset + (events.len() as u64) < total,
        events,
        total,
        pagination,
    })
}
