//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directive.
pub const LOG_LEVEL_ENV: &str = "APP_LOG_LEVEL";

/// Output format for log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per record.
    Json,
}

/// Install the global tracing subscriber.
///
/// The filter comes from [`LOG_LEVEL_ENV`] (e.g. `debug` or
/// `hybrid_rag=debug,warn`) and defaults to `info`. Returns `false` if a
/// global subscriber was already installed.
pub fn init_telemetry(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
        }
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.is_ok()
}
