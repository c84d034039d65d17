use chrono::{DateTime, Utc};

/// A fact emitted by the invoice workflow, or a signal derived from one.
///
/// Workflow events become audit entries (their `event_type` is the audit
/// record's type); signals are the outward notifications published afterwards.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted type name, e.g. `invoicing.invoice.review_started`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time, taken from the command that caused the event.
    fn occurred_at(&self) -> DateTime<Utc>;
}
