use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, error, info};

use invoiceflow_core::AuditEventId;

use super::hash::{GENESIS_HASH, compute_hash, verify_events};
use super::journal::Journal;
use super::ledger::{AuditLedger, SequenceRange};
use super::record::{AuditError, AuditEvent, ChainTail, NewAuditEvent, PartitionKey, VerifyReport};

#[derive(Debug, Default)]
struct Chain {
    events: Vec<AuditEvent>,
    /// Set once tampering is detected; blocks appends.
    halted: Option<String>,
}

impl Chain {
    fn tail_hash(&self) -> &str {
        self.events
            .last()
            .map(|e| e.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }
}

/// In-memory audit ledger with an optional write-through journal.
///
/// Each partition has its own lock, held only for the compare-and-append step,
/// so writers on different tenants never contend.
#[derive(Debug, Default)]
pub struct InMemoryAuditLedger {
    chains: RwLock<HashMap<PartitionKey, Arc<Mutex<Chain>>>>,
    journal: Option<Journal>,
}

fn poisoned() -> AuditError {
    AuditError::Storage("lock poisoned".to_string())
}

impl InMemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a journal-backed ledger, replaying and verifying what is on disk.
    ///
    /// A partition whose stored chain fails verification is loaded halted.
    pub fn with_journal(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let (journal, stored) = Journal::open(path)?;

        let mut grouped: BTreeMap<PartitionKey, Vec<AuditEvent>> = BTreeMap::new();
        for event in stored {
            grouped.entry(event.partition.clone()).or_default().push(event);
        }

        let mut chains = HashMap::with_capacity(grouped.len());
        for (partition, mut events) in grouped {
            events.sort_by_key(|e| e.sequence);
            let halted = match verify_events(&partition, GENESIS_HASH, &events) {
                Ok(_) => None,
                Err(err) => {
                    error!(partition = %partition, error = %err, "audit journal failed verification; partition halted");
                    Some(err.to_string())
                }
            };
            info!(partition = %partition, events = events.len(), "audit chain loaded from journal");
            chains.insert(partition, Arc::new(Mutex::new(Chain { events, halted })));
        }

        Ok(Self {
            chains: RwLock::new(chains),
            journal: Some(journal),
        })
    }

    fn chain(&self, partition: &PartitionKey) -> Result<Option<Arc<Mutex<Chain>>>, AuditError> {
        let chains = self.chains.read().map_err(|_| poisoned())?;
        Ok(chains.get(partition).cloned())
    }

    fn chain_or_create(&self, partition: &PartitionKey) -> Result<Arc<Mutex<Chain>>, AuditError> {
        if let Some(chain) = self.chain(partition)? {
            return Ok(chain);
        }
        let mut chains = self.chains.write().map_err(|_| poisoned())?;
        Ok(chains.entry(partition.clone()).or_default().clone())
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&self, partition: &PartitionKey, sequence: u64, f: impl FnOnce(&mut AuditEvent)) {
        if let Ok(Some(chain)) = self.chain(partition) {
            if let Ok(mut chain) = chain.lock() {
                if let Some(event) = chain.events.iter_mut().find(|e| e.sequence == sequence) {
                    f(event);
                }
            }
        }
    }
}

impl AuditLedger for InMemoryAuditLedger {
    fn append(
        &self,
        partition: &PartitionKey,
        event: NewAuditEvent,
        expected_prev_hash: &str,
    ) -> Result<AuditEvent, AuditError> {
        let chain = self.chain_or_create(partition)?;
        let mut chain = chain.lock().map_err(|_| poisoned())?;

        if chain.halted.is_some() {
            return Err(AuditError::PartitionHalted(partition.clone()));
        }
        let tail = chain.tail_hash();
        if tail != expected_prev_hash {
            return Err(AuditError::ChainIntegrity {
                partition: partition.clone(),
                expected: expected_prev_hash.to_string(),
                actual: tail.to_string(),
            });
        }

        let mut stored = AuditEvent {
            event_id: AuditEventId::new(),
            partition: partition.clone(),
            sequence: chain.events.len() as u64 + 1,
            occurred_at: event.occurred_at,
            event_type: event.event_type,
            actor: event.actor,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            action: event.action,
            before: event.before,
            after: event.after,
            reason: event.reason,
            references: event.references,
            prev_hash: tail.to_string(),
            hash: String::new(),
        };
        stored.hash = compute_hash(&stored)?;

        // Durable first; memory only reflects what the journal accepted.
        if let Some(journal) = &self.journal {
            journal.append(&stored)?;
        }
        chain.events.push(stored.clone());

        debug!(
            partition = %partition,
            sequence = stored.sequence,
            event_type = %stored.event_type,
            "audit event appended"
        );
        Ok(stored)
    }

    fn tail(&self, partition: &PartitionKey) -> Result<ChainTail, AuditError> {
        let Some(chain) = self.chain(partition)? else {
            return Ok(ChainTail {
                sequence: 0,
                hash: GENESIS_HASH.to_string(),
            });
        };
        let chain = chain.lock().map_err(|_| poisoned())?;
        Ok(ChainTail {
            sequence: chain.events.len() as u64,
            hash: chain.tail_hash().to_string(),
        })
    }

    fn read(
        &self,
        partition: &PartitionKey,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        let Some(chain) = self.chain(partition)? else {
            return Ok(Vec::new());
        };
        let chain = chain.lock().map_err(|_| poisoned())?;
        let start = usize::try_from(after_sequence)
            .unwrap_or(usize::MAX)
            .min(chain.events.len());
        Ok(chain.events[start..].iter().take(limit).cloned().collect())
    }

    fn verify(
        &self,
        partition: &PartitionKey,
        range: SequenceRange,
    ) -> Result<VerifyReport, AuditError> {
        let Some(chain) = self.chain(partition)? else {
            return Err(AuditError::NotFound(format!("partition {partition}")));
        };
        let mut chain = chain.lock().map_err(|_| poisoned())?;

        let len = chain.events.len() as u64;
        let from = range.from.max(1);
        let to = range.to.unwrap_or(len).min(len);

        let (anchor, slice) = if from > to {
            (chain.tail_hash().to_string(), &chain.events[0..0])
        } else {
            let anchor = if from == 1 {
                GENESIS_HASH.to_string()
            } else {
                chain.events[(from - 2) as usize].hash.clone()
            };
            (anchor, &chain.events[(from - 1) as usize..to as usize])
        };

        let events_checked = slice.len() as u64;
        let outcome = verify_events(partition, &anchor, slice);
        match outcome {
            Ok(tail_hash) => Ok(VerifyReport {
                partition: partition.clone(),
                from_sequence: from,
                to_sequence: to,
                events_checked,
                tail_hash,
            }),
            Err(err) => {
                if matches!(err, AuditError::TamperDetected { .. }) {
                    error!(partition = %partition, error = %err, "audit chain tampering detected; partition halted");
                    chain.halted = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    fn partitions(&self) -> Result<Vec<PartitionKey>, AuditError> {
        let chains = self.chains.read().map_err(|_| poisoned())?;
        let mut keys: Vec<PartitionKey> = chains.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn is_halted(&self, partition: &PartitionKey) -> Result<bool, AuditError> {
        match self.chain(partition)? {
            Some(chain) => Ok(chain.lock().map_err(|_| poisoned())?.halted.is_some()),
            None => Ok(false),
        }
    }
}
