//! Logging initialization using the `tracing` ecosystem.
//!
//! Diagnostics go to stderr so that stdout stays reserved for quote lines.
//! Provides:
//! - Console output (human-readable, or JSON lines with `json = true`)
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogOptions<'a> {
    /// Default level if `RUST_LOG` is not set (e.g. `"info"`).
    pub level: &'a str,
    /// Optional directory for daily-rotating log files.
    pub dir: Option<&'a str>,
    /// Log file prefix.
    pub file_prefix: &'a str,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. Returns an error if a global
/// subscriber is already installed.
pub fn init_logging(opts: &LogOptions<'_>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(opts.level));

    let console_layer = if opts.json {
        fmt::layer().json().with_target(true).with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).with_writer(std::io::stderr).boxed()
    };

    let file_layer = opts.dir.map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, opts.file_prefix);
        fmt::layer().with_writer(file_appender).with_ansi(false).with_target(true).with_thread_ids(true)
    });

    tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).try_init()?;
    Ok(())
}
