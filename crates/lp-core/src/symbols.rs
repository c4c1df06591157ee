//! Subscription set parsing.
//!
//! The symbol list comes either from the comma-separated `SYMBOLS` value or
//! from a CSV file whose header row names a `symbol` column. Both paths
//! normalize every entry, drop duplicates while keeping first-seen order, and
//! refuse to produce an empty list.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::error::{LpError, LpResult};
use crate::types::{Symbol, normalize_symbol};

/// Example shown whenever the symbol list is empty.
pub const SYMBOLS_EXAMPLE: &str = "700.HK,AAPL.US";

/// Parse a comma-separated symbol list such as `"700.HK, aapl ,,TSLA.US"`.
///
/// Empty entries are skipped. An entry that cannot be normalized fails the
/// whole list, since it came straight from the operator.
pub fn parse_symbol_list(value: &str) -> LpResult<Vec<Symbol>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let sym = normalize_symbol(raw)?;
        if seen.insert(sym.clone()) {
            out.push(sym);
        }
    }
    if out.is_empty() {
        return Err(LpError::Config(format!(
            "specify one or more symbols in the SYMBOLS environment variable, e.g. '{SYMBOLS_EXAMPLE}'"
        )));
    }
    Ok(out)
}

/// Read symbols from a CSV source with a `symbol` header column.
///
/// Rows with a blank cell are skipped silently; rows that fail normalization
/// are skipped with a warning.
pub fn read_symbols_csv<R: Read>(reader: R) -> LpResult<Vec<Symbol>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).flexible(true).trim(csv::Trim::All).from_reader(reader);

    let column = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| LpError::Config("symbols csv must have a 'symbol' header".into()))?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        let raw = record.get(column).unwrap_or("");
        if raw.is_empty() {
            continue;
        }
        match normalize_symbol(raw) {
            Ok(sym) => {
                if seen.insert(sym.clone()) {
                    out.push(sym);
                }
            }
            Err(e) => {
                let line = record.position().map_or(0, csv::Position::line);
                warn!("[symbols] skip invalid '{raw}' on line {line}: {e}");
            }
        }
    }

    if out.is_empty() {
        return Err(LpError::Config("no valid symbols in csv".into()));
    }
    Ok(out)
}

/// Open `path` and read it with [`read_symbols_csv`].
pub fn load_symbols_csv(path: &Path) -> LpResult<Vec<Symbol>> {
    let file = std::fs::File::open(path)
        .map_err(|e| LpError::Config(format!("symbols csv not found: {}: {e}", path.display())))?;
    read_symbols_csv(file)
}

fn csv_error(e: csv::Error) -> LpError {
    LpError::Config(format!("failed to read symbols csv: {e}"))
}
