use chrono::{DateTime, Utc};

/// A domain-agnostic transition fact.
///
/// Events describe a state change that has already been decided. The counter
/// ledger applies them immediately and does not retain them (there is no
/// historical log), but they stay versioned so hosting environments that do
/// persist them can evolve schemas.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "counter.count.incremented").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
