//! # lp-runner
//!
//! Subscribes to real-time quotes for a list of symbols and prints one line
//! per update until interrupted.
//!
//! Credentials and the symbol list come from the environment, usually seeded
//! from an environment file.
//!
//! # Usage
//!
//! ```bash
//! lp-runner --env-file /etc/lp-runner.env --log-level info
//! lp-runner --symbols 700.HK,AAPL.US --format json
//! ```

mod reporter;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lp_core::config::{AppConfig, load_env_file};
use lp_core::logging::{LogOptions, init_logging};
use lp_core::symbols::{load_symbols_csv, parse_symbol_list};
use lp_core::{SubType, Symbol};
use lp_quote::QuoteContext;
use tracing::{info, warn};

use crate::reporter::{ConsoleReporter, OutputFormat, dispatch};

const DEFAULT_ENV_FILE: &str = ".env";

/// LongPort real-time quote subscriber.
#[derive(Parser)]
#[command(name = "lp-runner", about = "LongPort real-time quote subscriber")]
struct Cli {
    /// Environment file to load before reading configuration.
    /// A missing file is only an error when the flag is given explicitly.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Comma-separated symbols; overrides `SYMBOLS`.
    #[arg(long, conflicts_with = "symbols_csv")]
    symbols: Option<String>,

    /// CSV file with a `symbol` column; overrides `SYMBOLS`.
    #[arg(long)]
    symbols_csv: Option<PathBuf>,

    /// Quote line format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn symbol_override(&self) -> Result<Option<Vec<Symbol>>> {
        if let Some(list) = &self.symbols {
            return Ok(Some(parse_symbol_list(list).context("invalid --symbols")?));
        }
        if let Some(path) = &self.symbols_csv {
            let symbols = load_symbols_csv(path).with_context(|| format!("invalid --symbols-csv {}", path.display()))?;
            return Ok(Some(symbols));
        }
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Environment file
    let (env_path, required) = match &cli.env_file {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_ENV_FILE), false),
    };
    let env_loaded = load_env_file(&env_path, required)?;

    // 2. Logging
    init_logging(&LogOptions {
        level: &cli.log_level,
        dir: cli.log_dir.as_deref(),
        file_prefix: "lp-runner",
        json: cli.log_json,
    })?;
    info!(
        "lp-runner starting, env_file={} ({}), log_level={}",
        env_path.display(),
        if env_loaded { "loaded" } else { "absent" },
        cli.log_level,
    );

    // 3. Configuration
    let config = AppConfig::from_env(cli.symbol_override()?).context("configuration error")?;
    info!("config loaded, {} symbol(s): {:?}", config.symbols.len(), config.quote);

    // 4. Connect and subscribe
    let (mut ctx, mut events) = QuoteContext::try_new(config.quote).await.context("failed to start quote session")?;
    ctx.subscribe(config.symbols.iter().cloned(), &[SubType::Quote], true).await.context("subscribe failed")?;
    info!("subscribed to {} symbol(s), press Ctrl+C to stop", config.symbols.len());

    // 5. Report until interrupted
    let mut reporter = ConsoleReporter::stdout(cli.format);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let outcome = loop {
        tokio::select! {
            r = &mut ctrl_c => {
                info!("shutdown signal received");
                break r.context("failed to listen for Ctrl+C");
            }
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(e) = dispatch(&mut reporter, event) {
                        break Err(anyhow::Error::new(e).context("failed to write quote"));
                    }
                }
                None => {
                    warn!("quote session ended");
                    break Ok(());
                }
            },
        }
    };

    // 6. Shutdown
    println!("Stopping subscription...");
    ctx.close().await;
    info!("quote session closed");
    outcome
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["lp-runner"]);
        assert!(cli.env_file.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.log_level, "info");
        assert!(cli.symbol_override().unwrap().is_none());
    }

    #[test]
    fn symbols_flag_overrides() {
        let cli = Cli::parse_from(["lp-runner", "--symbols", "700, aapl.us,700.HK", "--format", "json"]);
        let symbols = cli.symbol_override().unwrap().unwrap();
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, ["700.HK", "AAPL.US"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn symbols_and_csv_conflict() {
        assert!(Cli::try_parse_from(["lp-runner", "--symbols", "700.HK", "--symbols-csv", "s.csv"]).is_err());
    }

    #[test]
    fn invalid_symbols_flag_is_error() {
        let cli = Cli::parse_from(["lp-runner", "--symbols", "700.HK,???"]);
        assert!(cli.symbol_override().is_err());
    }
}
