//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "cmdlink=info";

/// A bare level applies to this crate only; anything else is a full filter.
fn directive_for(level: &str) -> String {
    let level = level.trim();
    match level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" | "off" => format!("cmdlink={}", level),
        _ => level.to_string(),
    }
}

fn filter_for(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::try_new(directive_for(level))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
    }
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `cmdlink=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter_for(None))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Initialize logging with an explicit filter directive (e.g. `debug`).
///
/// An unparseable directive falls back to `cmdlink=info`.
pub fn init_with_level(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(Some(level)))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(None))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        // First call may or may not succeed depending on test order
        let _ = try_init();
        let _ = try_init();
        let _ = init_with_level("debug");
    }

    #[test]
    fn test_directive_for() {
        assert_eq!(directive_for("debug"), "cmdlink=debug");
        assert_eq!(directive_for("WARN"), "cmdlink=WARN");
        assert_eq!(
            directive_for("cmdlink=trace,tower_http=debug"),
            "cmdlink=trace,tower_http=debug"
        );
    }

    #[test]
    fn test_logging_works() {
        let _ = try_init();

        tracing::info!("test info message");
        tracing::debug!("test debug message");
        tracing::warn!("test warn message");
    }
}
