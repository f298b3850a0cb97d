//! Tracing subscriber setup for binaries and tools.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=stockroom=trace` - Show trace for stockroom crates only
//! - Otherwise the configured filter, by default [`DEFAULT_LOG_FILTER`]

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the config file sets one.
pub const DEFAULT_LOG_FILTER: &str = "info,stockroom=debug,sqlx=warn";

/// Builds the filter: `RUST_LOG` first, then `configured`.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global fmt subscriber.
///
/// Fails if a subscriber is already installed (for example by a test
/// harness); callers may ignore that.
pub fn init_tracing(configured: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(configured))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        // Only meaningful without RUST_LOG; the fallback must not panic either way
        let filter = env_filter("stockroom=[");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_second_init_is_refused() {
        let _ = init_tracing(DEFAULT_LOG_FILTER);
        assert!(init_tracing(DEFAULT_LOG_FILTER).is_err());
    }
}
