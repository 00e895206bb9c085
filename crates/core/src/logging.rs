//! Logging and observability
//!
//! Structured logging via `tracing-subscriber`, with human-readable text or JSON
//! output selected at runtime. All log output goes to stderr so stdout stays free
//! for command output.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with an optional format.
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for text output, `"json"` for JSON lines.
///
/// ## Environment Variables
///
/// * `STACKENV_LOG_FORMAT` - format used when `format` is `None`
/// * `STACKENV_LOG` - filter directive (takes precedence over `RUST_LOG`)
/// * `RUST_LOG` - standard fallback filter
/// * `STACKENV_LOG_SPAN_EVENTS` - comma separated span events (`new`, `close`, `full`, ...)
///
/// ## Example
///
/// ```rust
/// use stackenv_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("STACKENV_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter from `STACKENV_LOG`, then `RUST_LOG`, then `info`
fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("STACKENV_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!(
                "Invalid STACKENV_LOG specification '{}', using default 'info'",
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Span lifecycle events; env var wins, otherwise JSON logs spans and text does not
fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var("STACKENV_LOG_SPAN_EVENTS") {
        let mut acc = FmtSpan::NONE;
        for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
            acc |= match token.as_str() {
                "new" => FmtSpan::NEW,
                "close" => FmtSpan::CLOSE,
                "enter" => FmtSpan::ENTER,
                "exit" => FmtSpan::EXIT,
                "active" => FmtSpan::ACTIVE,
                "full" => FmtSpan::FULL,
                _ => FmtSpan::NONE,
            };
        }
        return acc;
    }

    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
