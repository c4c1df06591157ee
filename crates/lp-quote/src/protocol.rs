//! Quote socket wire codec.
//!
//! All frames are JSON text. Outbound requests carry a client-chosen `id`
//! that the server echoes in its response:
//!
//! ```json
//! {"id": 2, "cmd": "subscribe", "symbols": ["700.HK"], "sub_types": ["quote"], "is_first_push": true}
//! {"id": 2, "code": 0, "msg": "", "data": null}
//! ```
//!
//! Pushes have no `id` and are routed by `cmd`:
//!
//! - `push_quote` → [`PushQuote`]
//! - `heartbeat`  → server keep-alive, ignored

use lp_core::{LpError, LpResult, PushQuote, SecurityQuote, SubType, Symbol, TradeSession, TradeStatus};
use serde::Serialize;
use serde_json::Value;

use crate::json_util::{f64_field_or_zero, i64_field_or_zero, parse_str_f64, parse_str_i64};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A request the client can send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Auth { otp: String },
    Subscribe { symbols: Vec<Symbol>, sub_types: Vec<SubType>, is_first_push: bool },
    Unsubscribe { symbols: Vec<Symbol>, sub_types: Vec<SubType> },
    Quote { symbols: Vec<Symbol> },
    Heartbeat,
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Auth { .. } => "auth",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::Quote { .. } => "quote",
            Command::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Serialize)]
struct RequestFrame<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a Command,
}

/// Encode a request frame.
pub fn encode_request(id: u64, command: &Command) -> LpResult<String> {
    Ok(serde_json::to_string(&RequestFrame { id, command })?)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Answer to one of our requests.
    Response { id: u64, code: i64, message: String, data: Value },
    /// Real-time quote push.
    Quote { symbol: Symbol, quote: PushQuote },
    /// Server-initiated keep-alive.
    Heartbeat,
    /// A push kind this client does not handle.
    Unhandled { cmd: String },
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> LpResult<Frame> {
    let v: Value = serde_json::from_str(text)?;

    if let Some(cmd) = v.get("cmd").and_then(Value::as_str) {
        // Pushes never carry an id; a `cmd` with an id is treated as a response.
        if v.get("id").is_none() {
            return match cmd {
                "push_quote" => parse_push_quote(&v),
                "heartbeat" => Ok(Frame::Heartbeat),
                other => Ok(Frame::Unhandled { cmd: other.to_string() }),
            };
        }
    }

    let id = v
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| LpError::Protocol(format!("frame has neither push cmd nor id: {text}")))?;
    let code = match v.get("code") {
        None | Some(Value::Null) => 0,
        Some(raw) => parse_str_i64(Some(raw))
            .ok_or_else(|| LpError::Protocol(format!("response id={id} has an unreadable code: {raw}")))?,
    };
    Ok(Frame::Response {
        id,
        code,
        message: v.get("msg").or_else(|| v.get("message")).and_then(Value::as_str).unwrap_or("").to_string(),
        data: v.get("data").cloned().unwrap_or(Value::Null),
    })
}

fn parse_push_quote(v: &Value) -> LpResult<Frame> {
    let raw_symbol = v
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| LpError::Protocol("push_quote without symbol".into()))?;
    let symbol = raw_symbol.parse::<Symbol>()?;
    let data = v.get("data").ok_or_else(|| LpError::Protocol(format!("push_quote for {symbol} without data")))?;
    let last_done = parse_str_f64(data.get("last_done"))
        .ok_or_else(|| LpError::Protocol(format!("push_quote for {symbol} without last_done")))?;

    let quote = PushQuote {
        last_done,
        open: f64_field_or_zero(data, "open"),
        high: f64_field_or_zero(data, "high"),
        low: f64_field_or_zero(data, "low"),
        timestamp: i64_field_or_zero(data, "timestamp"),
        volume: i64_field_or_zero(data, "volume"),
        turnover: f64_field_or_zero(data, "turnover"),
        trade_status: TradeStatus::from_code(i64_field_or_zero(data, "trade_status")),
        trade_session: TradeSession::from_code(i64_field_or_zero(data, "trade_session")),
    };
    Ok(Frame::Quote { symbol, quote })
}

/// Decode the `data` of a `quote` response.
///
/// Accepts either `{"secu_quote": [...]}` or a bare array.
pub fn parse_security_quotes(data: &Value) -> LpResult<Vec<SecurityQuote>> {
    let items = data
        .get("secu_quote")
        .and_then(Value::as_array)
        .or_else(|| data.as_array())
        .ok_or_else(|| LpError::Protocol("quote response has no secu_quote list".into()))?;

    items
        .iter()
        .map(|item| {
            let symbol = item
                .get("symbol")
                .and_then(Value::as_str)
                .ok_or_else(|| LpError::Protocol("quote entry without symbol".into()))?
                .parse::<Symbol>()?;
            Ok(SecurityQuote {
                symbol,
                last_done: f64_field_or_zero(item, "last_done"),
                prev_close: f64_field_or_zero(item, "prev_close"),
                open: f64_field_or_zero(item, "open"),
                high: f64_field_or_zero(item, "high"),
                low: f64_field_or_zero(item, "low"),
                timestamp: i64_field_or_zero(item, "timestamp"),
                volume: i64_field_or_zero(item, "volume"),
                turnover: f64_field_or_zero(item, "turnover"),
                trade_status: TradeStatus::from_code(i64_field_or_zero(item, "trade_status")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sym(s: &str) -> Symbol {
        s.parse().unwrap()
    }

    #[test]
    fn encode_subscribe() {
        let cmd = Command::Subscribe {
            symbols: vec![sym("700.HK"), sym("AAPL.US")],
            sub_types: vec![SubType::Quote],
            is_first_push: true,
        };
        let v: Value = serde_json::from_str(&encode_request(7, &cmd).unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "id": 7,
                "cmd": "subscribe",
                "symbols": ["700.HK", "AAPL.US"],
                "sub_types": ["quote"],
                "is_first_push": true
            })
        );
    }

    #[test]
    fn encode_auth_and_heartbeat() {
        let v: Value =
            serde_json::from_str(&encode_request(1, &Command::Auth { otp: "x".into() }).unwrap()).unwrap();
        assert_eq!(v, json!({"id": 1, "cmd": "auth", "otp": "x"}));
        let v: Value = serde_json::from_str(&encode_request(9, &Command::Heartbeat).unwrap()).unwrap();
        assert_eq!(v, json!({"id": 9, "cmd": "heartbeat"}));
    }

    #[test]
    fn parse_response() {
        let f = parse_frame(r#"{"id":3,"code":0,"msg":"","data":{"session_id":"s"}}"#).unwrap();
        assert_eq!(f, Frame::Response { id: 3, code: 0, message: String::new(), data: json!({"session_id": "s"}) });

        let f = parse_frame(r#"{"id":4,"code":301600,"message":"invalid symbol"}"#).unwrap();
        assert!(matches!(f, Frame::Response { id: 4, code: 301600, ref message, .. } if message == "invalid symbol"));
    }

    #[test]
    fn parse_quote_push_with_mixed_encodings() {
        let text = r#"{
            "cmd": "push_quote",
            "symbol": "700.HK",
            "data": {
                "last_done": "320.200", "open": "318.000", "high": 321.4, "low": "317.2",
                "timestamp": 1700000000, "volume": "123456", "turnover": "39500000.5",
                "trade_status": 0, "trade_session": "2"
            }
        }"#;
        match parse_frame(text).unwrap() {
            Frame::Quote { symbol, quote } => {
                assert_eq!(symbol.as_str(), "700.HK");
                assert!((quote.last_done - 320.2).abs() < 1e-9);
                assert!((quote.high - 321.4).abs() < 1e-9);
                assert_eq!(quote.timestamp, 1_700_000_000);
                assert_eq!(quote.volume, 123_456);
                assert_eq!(quote.trade_status, TradeStatus::Normal);
                assert_eq!(quote.trade_session, TradeSession::Post);
            }
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn string_code_is_decoded() {
        let f = parse_frame(r#"{"id":5,"code":"301600","msg":"invalid symbol"}"#).unwrap();
        assert!(matches!(f, Frame::Response { id: 5, code: 301600, .. }));

        let f = parse_frame(r#"{"id":6,"code":"0"}"#).unwrap();
        assert!(matches!(f, Frame::Response { id: 6, code: 0, .. }));

        let err = parse_frame(r#"{"id":7,"code":"oops"}"#).unwrap_err();
        assert!(matches!(err, LpError::Protocol(ref m) if m.contains("id=7")));
    }

    #[test]
    fn quote_push_without_price_is_error() {
        let text = r#"{"cmd":"push_quote","symbol":"AAPL.US","data":{"open":"1"}}"#;
        assert!(matches!(parse_frame(text), Err(LpError::Protocol(_))));
    }

    #[test]
    fn heartbeat_and_unhandled() {
        assert_eq!(parse_frame(r#"{"cmd":"heartbeat"}"#).unwrap(), Frame::Heartbeat);
        assert_eq!(
            parse_frame(r#"{"cmd":"push_depth","symbol":"700.HK"}"#).unwrap(),
            Frame::Unhandled { cmd: "push_depth".into() }
        );
    }

    #[test]
    fn garbage_is_protocol_error() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame(r#"{"hello":"world"}"#).is_err());
    }

    #[test]
    fn security_quotes() {
        let data = json!({"secu_quote": [
            {"symbol": "AAPL.US", "last_done": "190.5", "prev_close": "188.0", "volume": 10, "trade_status": 2}
        ]});
        let quotes = parse_security_quotes(&data).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol.as_str(), "AAPL.US");
        assert!((quotes[0].prev_close - 188.0).abs() < 1e-9);
        assert_eq!(quotes[0].trade_status, TradeStatus::Halted);

        assert!(parse_security_quotes(&json!([])).unwrap().is_empty());
        assert!(parse_security_quotes(&json!({"other": 1})).is_err());
    }
}
