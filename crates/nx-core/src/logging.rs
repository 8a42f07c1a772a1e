//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable, or JSON lines)
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or the config `log.level`

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogSettings;

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. Library code in `nx-core` and
/// `nx-md` only emits events; installing the subscriber is left to the binary.
///
/// `file_prefix` names the rotated files when `settings.dir` is set
/// (e.g. `"nx-runner"` produces `nx-runner.2026-10-19`).
pub fn init_logging(settings: &LogSettings, file_prefix: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.effective_level()));

    let json = settings.json.unwrap_or(false);
    let console_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .boxed()
    };

    let file_layer = settings.dir.as_deref().map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
        fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
