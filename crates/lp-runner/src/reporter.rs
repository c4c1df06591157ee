//! Console output for quote pushes.
//!
//! Quotes go to stdout, one line each. Connection lifecycle events only go
//! to the log.

use std::io::{self, Write};

use clap::ValueEnum;
use lp_core::time_util::format_unix_secs;
use lp_core::{PushQuote, Symbol, TradeSession};
use lp_quote::PushEvent;
use serde::Serialize;
use tracing::{error, info, warn};

/// Output format for quote lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// `700.HK: last_price=320.2, timestamp=2023-11-14T22:13:20Z`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Destination for quote pushes.
pub trait QuoteSink {
    fn on_quote(&mut self, symbol: &Symbol, quote: &PushQuote) -> io::Result<()>;
}

/// Route one session event. Quotes go to `sink`, the rest to the log.
pub fn dispatch<S: QuoteSink>(sink: &mut S, event: PushEvent) -> io::Result<()> {
    match event {
        PushEvent::Quote { symbol, quote } => sink.on_quote(&symbol, &quote)?,
        PushEvent::Connected => info!("[reporter] quote stream connected"),
        PushEvent::Disconnected { reason } => warn!("[reporter] quote stream disconnected: {reason}"),
        PushEvent::Error { message } => error!("[reporter] {message}"),
    }
    Ok(())
}

#[derive(Serialize)]
struct QuoteLine<'a> {
    symbol: &'a str,
    last_price: f64,
    open: f64,
    high: f64,
    low: f64,
    volume: i64,
    turnover: f64,
    timestamp: String,
    trade_session: TradeSession,
}

/// Writes quote lines to any `Write`, normally stdout.
pub struct ConsoleReporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> QuoteSink for ConsoleReporter<W> {
    fn on_quote(&mut self, symbol: &Symbol, quote: &PushQuote) -> io::Result<()> {
        let timestamp = format_unix_secs(quote.timestamp);
        match self.format {
            OutputFormat::Text => {
                writeln!(self.out, "{symbol}: last_price={}, timestamp={timestamp}", quote.last_done)?;
            }
            OutputFormat::Json => {
                let line = QuoteLine {
                    symbol: symbol.as_str(),
                    last_price: quote.last_done,
                    open: quote.open,
                    high: quote.high,
                    low: quote.low,
                    volume: quote.volume,
                    turnover: quote.turnover,
                    timestamp,
                    trade_session: quote.trade_session,
                };
                serde_json::to_writer(&mut self.out, &line)?;
                self.out.write_all(b"\n")?;
            }
        }
        // stdout is block-buffered when piped.
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> PushQuote {
        PushQuote { last_done: 320.2, timestamp: 1_700_000_000, volume: 1_000, ..Default::default() }
    }

    fn render(format: OutputFormat, events: Vec<PushEvent>) -> String {
        let mut reporter = ConsoleReporter::new(Vec::new(), format);
        for event in events {
            dispatch(&mut reporter, event).unwrap();
        }
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn text_line() {
        let symbol: Symbol = "700.HK".parse().unwrap();
        let out = render(OutputFormat::Text, vec![PushEvent::Quote { symbol, quote: quote() }]);
        assert_eq!(out, "700.HK: last_price=320.2, timestamp=2023-11-14T22:13:20Z\n");
    }

    #[test]
    fn json_line() {
        let symbol: Symbol = "AAPL.US".parse().unwrap();
        let out = render(OutputFormat::Json, vec![PushEvent::Quote { symbol, quote: quote() }]);
        let v: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(v["symbol"], "AAPL.US");
        assert_eq!(v["last_price"], 320.2);
        assert_eq!(v["volume"], 1000);
        assert_eq!(v["timestamp"], "2023-11-14T22:13:20Z");
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn lifecycle_events_print_nothing() {
        let out = render(
            OutputFormat::Text,
            vec![
                PushEvent::Connected,
                PushEvent::Disconnected { reason: "eof".into() },
                PushEvent::Error { message: "boom".into() },
            ],
        );
        assert!(out.is_empty());
    }
}
