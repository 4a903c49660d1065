//! Logging infrastructure for picview.
//!
//! All crates log through the `tracing` macros. The binary installs a
//! subscriber once at startup with [`init_tracing`]; tests use
//! [`init_test_tracing`].

mod types;

pub use types::{LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the process-wide subscriber, writing to stderr so stdout stays
/// free for the snapshot JSON. `RUST_LOG` wins over `default_level`.
///
/// Panics if a global subscriber is already set.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
        assert_eq!(LogLevel::Info.as_filter_str(), "info");
    }

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn prefix_formats_message() {
        assert_eq!(MessagePrefix::Error.format("boom"), "[FAIL] boom");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(MessagePrefix::None.format("plain"), "plain");
    }
}
