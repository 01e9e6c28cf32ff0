//! Logging and observability
//!
//! Structured logging through `tracing`, with either human-readable text or
//! JSON output selected at runtime. All output goes to stderr so that stdout
//! stays free for command results (for example `imagesmith volumes --output json`).

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter directive
pub const LOG_ENV: &str = "IMAGESMITH_LOG";

/// Environment variable selecting the log format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "IMAGESMITH_LOG_FORMAT";

/// Initialize the logging system
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for text output, `"json"` for JSON lines.
///   When `None`, `IMAGESMITH_LOG_FORMAT` is consulted.
///
/// ## Environment Variables
///
/// * `IMAGESMITH_LOG_FORMAT` - log output format
/// * `IMAGESMITH_LOG` - filter directive (e.g. `imagesmith_core=debug`)
/// * `RUST_LOG` - fallback filter directive
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var(LOG_FORMAT_ENV).ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(false).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var(LOG_ENV) {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid {} specification '{}', using default 'info'",
                LOG_ENV,
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_multiple_calls_safe() {
        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("text")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    #[serial]
    fn test_env_filter_with_env_vars() {
        let saved_rust_log = std::env::var_os("RUST_LOG");

        std::env::set_var(LOG_ENV, "imagesmith_core=trace");
        std::env::set_var("RUST_LOG", "warn");
        assert_eq!(create_env_filter().to_string(), "imagesmith_core=trace");

        std::env::remove_var(LOG_ENV);
        assert_eq!(create_env_filter().to_string(), "warn");

        std::env::set_var(LOG_ENV, "imagesmith_core=loudest");
        assert_eq!(create_env_filter().to_string(), "info");
        std::env::remove_var(LOG_ENV);

        match saved_rust_log {
            Some(value) => std::env::set_var("RUST_LOG", value),
            None => std::env::remove_var("RUST_LOG"),
        }
    }
}
