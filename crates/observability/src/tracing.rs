//! Tracing subscriber initialization.
//!
//! JSON lines on stderr, filtered by `RUST_LOG` when set and by the configured
//! default otherwise. Stdout stays free for the operator protocol.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Initialize with the `info` default.
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Initialize tracing for the process; `default_filter` applies when `RUST_LOG` is
/// unset or unparsable.
///
/// Safe to call multiple times: only the first call installs a subscriber and
/// returns `true`.
pub fn init_with_filter(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        ::tracing::debug!(default_filter, "tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_a_no_op() {
        let _ = init_with_filter("depot=debug");
        assert!(!init());
        assert!(!init_with_filter("not a [valid filter"));
    }
}
