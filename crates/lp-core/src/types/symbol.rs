//! Exchange-qualified ticker symbols.
//!
//! The quote service identifies securities as `CODE.MARKET` (e.g. `700.HK`,
//! `AAPL.US`). Users tend to type them in several other shapes (`00700`,
//! `HK.00700`, `US.AAPL`, bare `AAPL`), so [`normalize_symbol`] folds all of
//! those into the canonical form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Markets accepted in already-qualified `CODE.MARKET` input.
pub const KNOWN_MARKETS: &[&str] = &["HK", "US", "SH", "SZ", "SG"];

/// Longest HK numeric code we accept (`00700` style).
const HK_CODE_MAX_DIGITS: usize = 5;

/// Longest US ticker we accept, excluding the market suffix.
const US_TICKER_MAX_LEN: usize = 10;

/// Errors from symbol normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// Input was empty after trimming.
    #[error("empty symbol")]
    Empty,

    /// Input matched none of the supported shapes.
    #[error("unsupported symbol format: '{0}'")]
    Unsupported(String),
}

/// A normalized `CODE.MARKET` symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// The canonical string form (e.g. `"700.HK"`).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_symbol(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        normalize_symbol(&s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize user input into a canonical [`Symbol`].
///
/// Accepted shapes, case-insensitive:
///
/// | Input                         | Result    |
/// |-------------------------------|-----------|
/// | `700`, `00700`, `HK.00700`    | `700.HK`  |
/// | `700.HK`, `00700.HK`          | `700.HK`  |
/// | `AAPL`, `US.AAPL`, `AAPL.US`  | `AAPL.US` |
/// | `BRK.B.US`                    | `BRK.B.US`|
/// | `600519.SH`, `D05.SG`         | unchanged |
pub fn normalize_symbol(raw: &str) -> Result<Symbol, SymbolError> {
    let s = raw.trim().to_ascii_uppercase();
    if s.is_empty() {
        return Err(SymbolError::Empty);
    }

    // HK.00700 / 00700
    let hk_body = s.strip_prefix("HK.").unwrap_or(&s);
    if is_hk_code(hk_body) {
        return Ok(canon_hk(hk_body));
    }
    // 00700.HK
    if let Some(code) = s.strip_suffix(".HK") {
        if is_hk_code(code) {
            return Ok(canon_hk(code));
        }
    }

    // AAPL.US / BRK.B.US
    if let Some(ticker) = s.strip_suffix(".US") {
        if is_us_ticker(ticker, false) {
            return Ok(Symbol(format!("{ticker}.US")));
        }
    }
    // US.AAPL / AAPL
    let us_body = s.strip_prefix("US.").unwrap_or(&s);
    if is_us_ticker(us_body, true) {
        return Ok(Symbol(format!("{us_body}.US")));
    }

    // Already qualified for another market.
    if let Some((code, market)) = s.rsplit_once('.') {
        if !code.is_empty() && KNOWN_MARKETS.contains(&market) && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(Symbol(s));
        }
    }

    Err(SymbolError::Unsupported(raw.trim().to_string()))
}

fn is_hk_code(s: &str) -> bool {
    !s.is_empty() && s.len() <= HK_CODE_MAX_DIGITS && s.bytes().all(|b| b.is_ascii_digit())
}

fn canon_hk(code: &str) -> Symbol {
    let trimmed = code.trim_start_matches('0');
    let code = if trimmed.is_empty() { "0" } else { trimmed };
    Symbol(format!("{code}.HK"))
}

/// A bare ticker must start with a letter so that e.g. `600519.SH` is not
/// taken for a US symbol; with the `.US` suffix present digits may lead.
fn is_us_ticker(s: &str, require_alpha_start: bool) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if require_alpha_start && !first.is_ascii_alphabetic() {
        return false;
    }
    if require_alpha_start && s.contains('.') {
        // `BRK.B` without a suffix is ambiguous with `CODE.MARKET`; only
        // accept it when the trailing part is not a market code.
        if let Some((_, tail)) = s.rsplit_once('.') {
            if KNOWN_MARKETS.contains(&tail) {
                return false;
            }
        }
    }
    s.len() <= US_TICKER_MAX_LEN && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}
