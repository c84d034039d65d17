//! Tamper-evident audit ledger.
//!
//! Every component writes its decisions here and nowhere else. Events form a
//! SHA-256 hash chain per partition (one per tenant); the chain can be
//! re-verified from genesis at any time.

pub mod hash;
pub mod in_memory;
pub mod journal;
pub mod ledger;
pub mod query;
pub mod record;
pub mod writer;

pub use hash::{GENESIS_HASH, compute_hash, verify_events};
pub use in_memory::InMemoryAuditLedger;
pub use journal::Journal;
pub use ledger::{AuditLedger, SequenceRange};
pub use query::{AuditCursor, AuditFilter, AuditQueryResult, Pagination, query};
pub use record::{AuditError, AuditEvent, ChainTail, NewAuditEvent, PartitionKey, VerifyReport};
pub use writer::{AuditWriter, REDACTED};
