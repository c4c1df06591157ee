//! Quote data structures: what the quote service pushes and returns.
//!
//! # Timestamp convention
//!
//! `timestamp` is the exchange time of the last trade in **seconds since Unix
//! epoch**, as sent by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

// ---------------------------------------------------------------------------
// SubType
// ---------------------------------------------------------------------------

/// Kind of real-time data a subscription asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubType {
    /// Last price, OHLC, volume and turnover.
    Quote,
    /// Order book levels.
    Depth,
    /// Broker queue.
    Brokers,
    /// Tick-by-tick trades.
    Trade,
}

impl SubType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubType::Quote => "quote",
            SubType::Depth => "depth",
            SubType::Brokers => "brokers",
            SubType::Trade => "trade",
        }
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trade status / session
// ---------------------------------------------------------------------------

/// Trading status of a security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    #[default]
    Normal,
    Halted,
    Delisted,
    Fuse,
    PrepareList,
    CodeMoved,
    ToBeOpened,
    SplitStockHalts,
    Expired,
    WarrantPrepareList,
    SuspendTrade,
}

impl TradeStatus {
    /// Map the wire code to a status. Unknown codes fall back to `Normal`.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => TradeStatus::Halted,
            3 => TradeStatus::Delisted,
            4 => TradeStatus::Fuse,
            5 => TradeStatus::PrepareList,
            6 => TradeStatus::CodeMoved,
            7 => TradeStatus::ToBeOpened,
            8 => TradeStatus::SplitStockHalts,
            9 => TradeStatus::Expired,
            10 => TradeStatus::WarrantPrepareList,
            11 => TradeStatus::SuspendTrade,
            _ => TradeStatus::Normal,
        }
    }
}

/// Trading session the quote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSession {
    #[default]
    Normal,
    Pre,
    Post,
    Overnight,
}

impl TradeSession {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TradeSession::Pre,
            2 => TradeSession::Post,
            3 => TradeSession::Overnight,
            _ => TradeSession::Normal,
        }
    }
}

// ---------------------------------------------------------------------------
// PushQuote
// ---------------------------------------------------------------------------

/// A real-time quote update for one symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushQuote {
    /// Latest price.
    pub last_done: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Time of the latest trade (seconds since epoch).
    pub timestamp: i64,
    /// Accumulated volume.
    pub volume: i64,
    /// Accumulated turnover.
    pub turnover: f64,
    pub trade_status: TradeStatus,
    pub trade_session: TradeSession,
}

// ---------------------------------------------------------------------------
// SecurityQuote
// ---------------------------------------------------------------------------

/// A quote snapshot returned by an explicit `quote` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityQuote {
    pub symbol: Symbol,
    pub last_done: f64,
    pub prev_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub timestamp: i64,
    pub volume: i64,
    pub turnover: f64,
    pub trade_status: TradeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_type_display_and_serde() {
        assert_eq!(SubType::Brokers.to_string(), "brokers");
        assert_eq!(serde_json::to_string(&SubType::Depth).unwrap(), "\"depth\"");
    }

    #[test]
    fn trade_status_codes() {
        assert_eq!(TradeStatus::from_code(0), TradeStatus::Normal);
        assert_eq!(TradeStatus::from_code(2), TradeStatus::Halted);
        assert_eq!(TradeStatus::from_code(11), TradeStatus::SuspendTrade);
        assert_eq!(TradeStatus::from_code(999), TradeStatus::Normal);
        assert_eq!(TradeSession::from_code(1), TradeSession::Pre);
    }
}
