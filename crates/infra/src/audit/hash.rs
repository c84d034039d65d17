//! Hash chain construction and verification.
//!
//! Each event hash is `SHA-256(domain || fields || prev_hash)` where every
//! field is length-prefixed and JSON snapshots are serialized with sorted keys,
//! so the digest does not depend on map iteration order.

use chrono::SecondsFormat;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use super::record::{AuditError, AuditEvent, PartitionKey};

/// `prev_hash` of the first event in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const DOMAIN_AUDIT_EVENT: &[u8] = b"INVOICEFLOW_AUDIT_EVENT_V1";

fn put(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u32).to_be_bytes());
    hasher.update(field.as_bytes());
}

fn canonical_json(value: &JsonValue) -> Result<String, AuditError> {
    // `serde_json::Map` is ordered by key unless `preserve_order` is enabled.
    Ok(serde_json::to_string(value)?)
}

/// Hash over every field of `event` except `hash` itself.
pub fn compute_hash(event: &AuditEvent) -> Result<String, AuditError> {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_AUDIT_EVENT);
    put(&mut hasher, event.partition.as_str());
    hasher.update(event.sequence.to_be_bytes());
    put(&mut hasher, &event.event_id.to_string());
    put(
        &mut hasher,
        &event.occurred_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    );
    put(&mut hasher, &event.event_type);
    put(&mut hasher, &event.actor);
    put(&mut hasher, &event.resource_type);
    put(&mut hasher, &event.resource_id);
    put(&mut hasher, &event.action);
    put(&mut hasher, &canonical_json(&event.before)?);
    put(&mut hasher, &canonical_json(&event.after)?);
    put(&mut hasher, event.reason.as_deref().unwrap_or(""));
    hasher.update([u8::from(event.reason.is_some())]);
    put(
        &mut hasher,
        &event
            .references
            .map(|id| id.to_string())
            .unwrap_or_default(),
    );
    put(&mut hasher, &event.prev_hash);
    Ok(hex::encode(hasher.finalize()))
}

/// Verify a contiguous run of events.
///
/// `anchor` is the hash the first event must link to (`GENESIS_HASH` when the
/// run starts at sequence 1). Returns the hash of the last event, or `anchor`
/// for an empty run.
pub fn verify_events(
    partition: &PartitionKey,
    anchor: &str,
    events: &[AuditEvent],
) -> Result<String, AuditError> {
    let tamper = |sequence: u64, reason: String| AuditError::TamperDetected {
        partition: partition.clone(),
        sequence,
        reason,
    };

    let mut prev_hash = anchor.to_string();
    let mut expected_seq = events.first().map(|e| e.sequence).unwrap_or(1);

    for event in events {
        if event.partition != *partition {
            return Err(tamper(
                event.sequence,
                format!("event belongs to partition {}", event.partition),
            ));
        }
        if event.sequence != expected_seq {
            return Err(tamper(
                event.sequence,
                format!("sequence gap: expected {expected_seq}"),
            ));
        }
        if event.prev_hash != prev_hash {
            return Err(tamper(event.sequence, "broken link to previous event".to_string()));
        }
        let recomputed = compute_hash(event)?;
        if recomputed != event.hash {
            return Err(tamper(event.sequence, "content hash mismatch".to_string()));
        }
        prev_hash = recomputed;
        expected_seq += 1;
    }

    Ok(prev_hash)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use invoiceflow_core::AuditEventId;
    use proptest::prelude::*;
    use serde_json::json;

    pub(crate) fn chain(partition: &PartitionKey, len: usize) -> Vec<AuditEvent> {
        let start = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let mut prev = GENESIS_HASH.to_string();
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let mut event = AuditEvent {
                event_id: AuditEventId::new(),
                partition: partition.clone(),
                sequence: i as u64 + 1,
                occurred_at: start + Duration::seconds(i as i64),
                event_type: "invoicing.invoice.task_decided".to_string(),
                actor: format!("approver-{i}"),
                resource_type: "invoice".to_string(),
                resource_id: "inv-1".to_string(),
                action: "approve".to_string(),
                before: json!({ "status": "review_pending", "n": i }),
                after: json!({ "status": "review_pending", "n": i + 1 }),
                reason: (i % 2 == 0).then(|| "looks fine".to_string()),
                references: None,
                prev_hash: prev.clone(),
                hash: String::new(),
            };
            event.hash = compute_hash(&event).unwrap();
            prev = event.hash.clone();
            out.push(event);
        }
        out
    }

    #[test]
    fn intact_chain_reproduces_tail_hash() {
        let p = PartitionKey::named("t");
        let events = chain(&p, 10);
        let tail = verify_events(&p, GENESIS_HASH, &events).unwrap();
        assert_eq!(tail, events[9].hash);
    }

    #[test]
    fn verifies_a_suffix_from_its_anchor() {
        let p = PartitionKey::named("t");
        let events = chain(&p, 6);
        let tail = verify_events(&p, &events[2].hash, &events[3..]).unwrap();
        assert_eq!(tail, events[5].hash);
    }

    #[test]
    fn empty_run_returns_anchor() {
        let p = PartitionKey::named("t");
        assert_eq!(verify_events(&p, GENESIS_HASH, &[]).unwrap(), GENESIS_HASH);
    }

    #[test]
    fn hash_ignores_json_key_order() {
        let p = PartitionKey::named("t");
        let mut a = chain(&p, 1).remove(0);
        a.after = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let mut b = a.clone();
        b.after = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    #[test]
    fn dropped_event_is_a_gap() {
        let p = PartitionKey::named("t");
        let mut events = chain(&p, 5);
        events.remove(2);
        let err = verify_events(&p, GENESIS_HASH, &events).unwrap_err();
        assert!(matches!(err, AuditError::TamperDetected { sequence: 4, .. }));
    }

    #[derive(Debug, Clone)]
    enum Mutation {
        Actor,
        Action,
        Reason,
        After,
        OccurredAt,
        PrevHash,
        ResourceId,
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        prop_oneof![
            Just(Mutation::Actor),
            Just(Mutation::Action),
            Just(Mutation::Reason),
            Just(Mutation::After),
            Just(Mutation::OccurredAt),
            Just(Mutation::PrevHash),
            Just(Mutation::ResourceId),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn any_single_field_mutation_is_detected(
            len in 1usize..12,
            pick in any::<prop::sample::Index>(),
            m in mutation(),
        ) {
            let p = PartitionKey::named("tenant:prop");
            let mut events = chain(&p, len);
            let idx = pick.index(len);
            let target = &mut events[idx];
            match m {
                Mutation::Actor => target.actor.push('x'),
                Mutation::Action => target.action = "reject".to_string(),
                Mutation::Reason => {
                    target.reason = match target.reason.take() {
                        Some(_) => None,
                        None => Some(String::new()),
                    }
                }
                Mutation::After => target.after = json!({ "status": "approved" }),
                Mutation::OccurredAt => target.occurred_at += Duration::nanoseconds(1),
                Mutation::PrevHash => target.prev_hash = "f".repeat(64),
                Mutation::ResourceId => target.resource_id = "inv-2".to_string(),
            }

            let result = verify_events(&p, GENESIS_HASH, &events);
            let detected = matches!(result, Err(AuditError::TamperDetected { .. }));
            prop_assert!(detected);
        }
    }
}
