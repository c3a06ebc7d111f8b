use chrono::{DateTime, Utc};

/// A recorded fact about an item, counterparty, receipt or deal. Once appended to
/// a stream it is never edited; corrections are new events.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `<context>.<aggregate>.<fact>` name, e.g. `inventory.item.stock_consumed`.
    /// Stored next to the payload and used to route decoding.
    fn event_type(&self) -> &'static str;

    /// Payload layout revision, bumped when the serialized shape changes.
    fn schema_version(&self) -> u32;

    /// Business time: when the operator or admin acted, not when it was stored.
    fn occurred_at(&self) -> DateTime<Utc>;
}
