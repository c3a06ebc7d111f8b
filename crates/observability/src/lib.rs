//! Process-wide tracing setup shared by the depot binaries.

/// Subscriber configuration (filters, JSON output).
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, init, init_with_filter};
