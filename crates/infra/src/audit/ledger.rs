use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::record::{AuditError, AuditEvent, ChainTail, NewAuditEvent, PartitionKey, VerifyReport};

/// Inclusive range of chain sequence numbers. `to: None` means "through the tail".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl SequenceRange {
    pub fn all() -> Self {
        Self { from: 1, to: None }
    }

    pub fn between(from: u64, to: u64) -> Self {
        Self { from, to: Some(to) }
    }

    pub fn starting_at(from: u64) -> Self {
        Self { from, to: None }
    }
}

/// Append-only, hash-chained audit log partitioned into independent chains.
///
/// ## Append semantics
///
/// `append` is optimistic: the caller passes the tail hash it observed and the
/// ledger refuses the write with `ChainIntegrity` if another writer got there
/// first. Callers re-read the tail and retry (see `AuditWriter`). A successful
/// append is durable before it returns.
///
/// ## Integrity
///
/// `verify` recomputes hashes over a range. A mismatch yields `TamperDetected`
/// and halts the partition: further appends fail with `PartitionHalted` until
/// an operator intervenes. Other partitions are unaffected.
///
/// There is no update or delete. Corrections are new events that reference the
/// corrected event's ID.
pub trait AuditLedger: Send + Sync {
    fn append(
        &self,
        partition: &PartitionKey,
        event: NewAuditEvent,
        expected_prev_hash: &str,
    ) -> Result<AuditEvent, AuditError>;

    /// Current tail; `(0, GENESIS_HASH)` for an empty chain.
    fn tail(&self, partition: &PartitionKey) -> Result<ChainTail, AuditError>;

    /// Up to `limit` events with `sequence > after_sequence`, in chain order.
    fn read(
        &self,
        partition: &PartitionKey,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, AuditError>;

    fn verify(&self, partition: &PartitionKey, range: SequenceRange)
    -> Result<VerifyReport, AuditError>;

    fn partitions(&self) -> Result<Vec<PartitionKey>, AuditError>;

    fn is_halted(&self, partition: &PartitionKey) -> Result<bool, AuditError>;
}

impl<L> AuditLedger for Arc<L>
where
    L: AuditLedger + ?Sized,
{
    fn append(
        &self,
        partition: &PartitionKey,
        event: NewAuditEvent,
        expected_prev_hash: &str,
    ) -> Result<AuditEvent, AuditError> {
        (**self).append(partition, event, expected_prev_hash)
    }

    fn tail(&self, partition: &PartitionKey) -> Result<ChainTail, AuditError> {
        (**self).tail(partition)
    }

    fn read(
        &self,
        partition: &PartitionKey,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        (**self).read(partition, after_sequence, limit)
    }

    fn verify(
        &self,
        partition: &PartitionKey,
        range: SequenceRange,
    ) -> Result<VerifyReport, AuditError> {
        (**self).verify(partition, range)
    }

    fn partitions(&self) -> Result<Vec<PartitionKey>, AuditError> {
        (**self).partitions()
    }

    fn is_halted(&self, partition: &PartitionKey) -> Result<bool, AuditError> {
        (**self).is_halted(partition)
    }
}
