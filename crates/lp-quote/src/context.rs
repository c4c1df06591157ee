//! Public quote client handle.
//!
//! # Lifecycle
//!
//! 1. [`QuoteContext::try_new`] performs the first connect (OTP, socket,
//!    auth) so bad credentials fail fast, then hands the socket to a
//!    background session task.
//! 2. [`subscribe`](QuoteContext::subscribe) / [`unsubscribe`](QuoteContext::unsubscribe)
//!    change the subscription set; pushes arrive on the [`PushEventReceiver`].
//! 3. [`close`](QuoteContext::close) stops the session and waits for it.

use std::time::Duration;

use lp_core::config::QuoteConfig;
use lp_core::{LpError, LpResult, SecurityQuote, SubType, Symbol};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use crate::event::PushEventReceiver;
use crate::http::HttpClient;
use crate::protocol::{self, Command};
use crate::session::{Session, SessionCommand};

/// Handle to a running quote session.
pub struct QuoteContext {
    cmd_tx: mpsc::Sender<SessionCommand>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<()>>,
    request_timeout: Duration,
}

impl QuoteContext {
    /// Connect and authenticate, returning the context and its push receiver.
    pub async fn try_new(config: QuoteConfig) -> LpResult<(Self, PushEventReceiver)> {
        let http = HttpClient::new(&config)?;
        let request_timeout = config.request_timeout;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut session = Session::new(config, http, event_tx);
        let ws = session.connect().await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session.run(ws, cmd_rx, shutdown_rx));

        let ctx = Self { cmd_tx, shutdown_tx: Some(shutdown_tx), task: Some(task), request_timeout };
        Ok((ctx, event_rx))
    }

    /// Subscribe `symbols` to `sub_types`.
    ///
    /// With `is_first_push` the server immediately pushes the current state
    /// of each subscription.
    pub async fn subscribe<I>(&self, symbols: I, sub_types: &[SubType], is_first_push: bool) -> LpResult<()>
    where
        I: IntoIterator<Item = Symbol>,
    {
        let symbols = non_empty(symbols, "subscribe")?;
        let count = symbols.len();
        self.request(Command::Subscribe { symbols, sub_types: sub_types.to_vec(), is_first_push }).await?;
        info!("[quote-ctx] subscribed {count} symbol(s) to {sub_types:?}");
        Ok(())
    }

    /// Remove `sub_types` from `symbols`.
    pub async fn unsubscribe<I>(&self, symbols: I, sub_types: &[SubType]) -> LpResult<()>
    where
        I: IntoIterator<Item = Symbol>,
    {
        let symbols = non_empty(symbols, "unsubscribe")?;
        self.request(Command::Unsubscribe { symbols, sub_types: sub_types.to_vec() }).await?;
        Ok(())
    }

    /// Current subscriptions, sorted by symbol.
    pub async fn subscriptions(&self) -> LpResult<Vec<(Symbol, Vec<SubType>)>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(SessionCommand::Subscriptions { reply }).await.map_err(|_| LpError::Closed)?;
        rx.await.map_err(|_| LpError::Closed)
    }

    /// Fetch a quote snapshot for `symbols`.
    pub async fn quote<I>(&self, symbols: I) -> LpResult<Vec<SecurityQuote>>
    where
        I: IntoIterator<Item = Symbol>,
    {
        let symbols = non_empty(symbols, "quote")?;
        let data = self.request(Command::Quote { symbols }).await?;
        protocol::parse_security_quotes(&data)
    }

    /// Stop the session task and wait for it to finish. Idempotent.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn request(&self, command: Command) -> LpResult<Value> {
        let name = command.name();
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(SessionCommand::Request { command, reply }).await.map_err(|_| LpError::Closed)?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LpError::Closed),
            Err(_) => Err(LpError::Timeout(name.to_string())),
        }
    }
}

fn non_empty<I>(symbols: I, op: &str) -> LpResult<Vec<Symbol>>
where
    I: IntoIterator<Item = Symbol>,
{
    let symbols: Vec<Symbol> = symbols.into_iter().collect();
    if symbols.is_empty() {
        return Err(LpError::Config(format!("{op} needs at least one symbol")));
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::event::PushEvent;

    /// HTTP server answering every request with an OTP.
    async fn otp_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = sock.read(&mut buf).await;
                    let body = r#"{"code":0,"data":{"otp":"otp-1"}}"#;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                });
            }
        });
        addr
    }

    #[derive(Clone, Copy, Default)]
    struct MockBehavior {
        /// Auth response code; non-zero rejects.
        auth_code: i64,
        /// Close the first connection right after acking a subscribe.
        drop_first_after_subscribe: bool,
        /// Answer auth, then record requests without ever replying.
        silent_after_auth: bool,
    }

    /// Quote WebSocket server. Every request frame it receives is forwarded
    /// to the returned channel as `(connection_index, frame)`.
    async fn ws_server(behavior: MockBehavior) -> (SocketAddr, mpsc::UnboundedReceiver<(usize, Value)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut conn_idx = 0usize;
            loop {
                let Ok((sock, _)) = listener.accept().await else { return };
                let Ok(mut ws) = tokio_tungstenite::accept_async(sock).await else { continue };
                let idx = conn_idx;
                conn_idx += 1;
                let seen_tx = seen_tx.clone();
                tokio::spawn(async move {
                    while let Some(Ok(msg)) = ws.next().await {
                        let Message::Text(text) = msg else { continue };
                        let req: Value = serde_json::from_str(&text).unwrap();
                        let _ = seen_tx.send((idx, req.clone()));
                        let id = req["id"].clone();
                        let cmd = req["cmd"].as_str().unwrap_or("");
                        if behavior.silent_after_auth && cmd != "auth" {
                            continue;
                        }
                        match cmd {
                            "auth" => {
                                let code = behavior.auth_code;
                                let msg = if code == 0 { "" } else { "denied" };
                                let resp = json!({"id": id, "code": code, "msg": msg});
                                ws.send(Message::Text(resp.to_string().into())).await.unwrap();
                            }
                            "subscribe" => {
                                ws.send(Message::Text(json!({"id": id, "code": 0}).to_string().into())).await.unwrap();
                                let symbol = req["symbols"][0].clone();
                                let push = json!({
                                    "cmd": "push_quote",
                                    "symbol": symbol,
                                    "data": {"last_done": "320.200", "open": "318", "high": "321", "low": "317",
                                             "timestamp": 1700000000, "volume": 1000, "turnover": "320200"}
                                });
                                ws.send(Message::Text(push.to_string().into())).await.unwrap();
                                if behavior.drop_first_after_subscribe && idx == 0 {
                                    let _ = ws.close(None).await;
                                    return;
                                }
                            }
                            "quote" => {
                                let resp = json!({"id": id, "code": 0, "data": {"secu_quote": [
                                    {"symbol": req["symbols"][0], "last_done": "190.5", "prev_close": "188"}
                                ]}});
                                ws.send(Message::Text(resp.to_string().into())).await.unwrap();
                            }
                            _ => {
                                ws.send(Message::Text(json!({"id": id, "code": 0}).to_string().into())).await.unwrap();
                            }
                        }
                    }
                });
            }
        });
        (addr, seen_rx)
    }

    fn config(http: SocketAddr, ws: SocketAddr) -> QuoteConfig {
        QuoteConfig {
            app_key: "key".into(),
            app_secret: "secret".into(),
            access_token: "token".into(),
            http_url: format!("http://{http}"),
            quote_ws_url: format!("ws://{ws}/v2"),
            heartbeat_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }

    async fn next_event(rx: &mut PushEventReceiver) -> PushEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("event timeout").expect("channel closed")
    }

    fn sym(s: &str) -> Symbol {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn subscribe_receives_quotes_and_snapshot() {
        let http = otp_server().await;
        let (ws, mut seen) = ws_server(MockBehavior::default()).await;

        let (mut ctx, mut events) = QuoteContext::try_new(config(http, ws)).await.unwrap();
        let (_, auth) = seen.recv().await.unwrap();
        assert_eq!(auth["cmd"], "auth");
        assert_eq!(auth["otp"], "otp-1");

        assert_eq!(next_event(&mut events).await, PushEvent::Connected);

        ctx.subscribe(vec![sym("700.HK")], &[SubType::Quote], true).await.unwrap();
        let (_, sub) = seen.recv().await.unwrap();
        assert_eq!(sub["cmd"], "subscribe");
        assert_eq!(sub["symbols"], json!(["700.HK"]));
        assert_eq!(sub["is_first_push"], true);

        match next_event(&mut events).await {
            PushEvent::Quote { symbol, quote } => {
                assert_eq!(symbol.as_str(), "700.HK");
                assert!((quote.last_done - 320.2).abs() < 1e-9);
                assert_eq!(quote.timestamp, 1_700_000_000);
            }
            other => panic!("expected quote, got {other:?}"),
        }

        assert_eq!(ctx.subscriptions().await.unwrap(), vec![(sym("700.HK"), vec![SubType::Quote])]);

        let quotes = ctx.quote(vec![sym("AAPL.US")]).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol.as_str(), "AAPL.US");

        ctx.unsubscribe(vec![sym("700.HK")], &[SubType::Quote]).await.unwrap();
        assert!(ctx.subscriptions().await.unwrap().is_empty());

        ctx.close().await;
        assert!(matches!(ctx.quote(vec![sym("AAPL.US")]).await, Err(LpError::Closed)));
    }

    #[tokio::test]
    async fn auth_rejection_fails_try_new() {
        let http = otp_server().await;
        let (ws, _seen) = ws_server(MockBehavior { auth_code: 403001, ..Default::default() }).await;

        match QuoteContext::try_new(config(http, ws)).await {
            Err(LpError::Auth(msg)) => assert!(msg.contains("403001")),
            Err(other) => panic!("expected auth error, got {other}"),
            Ok(_) => panic!("expected auth error"),
        }
    }

    #[tokio::test]
    async fn reconnect_restores_subscriptions() {
        let http = otp_server().await;
        let (ws, mut seen) = ws_server(MockBehavior { drop_first_after_subscribe: true, ..Default::default() }).await;

        let (mut ctx, mut events) = QuoteContext::try_new(config(http, ws)).await.unwrap();
        assert_eq!(next_event(&mut events).await, PushEvent::Connected);
        ctx.subscribe(vec![sym("AAPL.US")], &[SubType::Quote], true).await.unwrap();

        // quote push, then the server drops us
        assert!(matches!(next_event(&mut events).await, PushEvent::Quote { .. }));
        assert!(matches!(next_event(&mut events).await, PushEvent::Disconnected { .. }));
        assert_eq!(next_event(&mut events).await, PushEvent::Connected);

        // second connection: auth then the restored subscription
        let resubscribe = loop {
            let (idx, frame) = seen.recv().await.unwrap();
            if idx == 1 && frame["cmd"] == "subscribe" {
                break frame;
            }
        };
        assert_eq!(resubscribe["symbols"], json!(["AAPL.US"]));
        assert_eq!(resubscribe["sub_types"], json!(["quote"]));

        ctx.close().await;
    }

    #[tokio::test]
    async fn empty_symbol_list_rejected() {
        let http = otp_server().await;
        let (ws, _seen) = ws_server(MockBehavior::default()).await;
        let (mut ctx, _events) = QuoteContext::try_new(config(http, ws)).await.unwrap();
        assert!(matches!(ctx.subscribe(Vec::new(), &[SubType::Quote], true).await, Err(LpError::Config(_))));
        ctx.close().await;
    }

    #[tokio::test]
    async fn heartbeat_sent_each_interval() {
        let http = otp_server().await;
        let (ws, mut seen) = ws_server(MockBehavior::default()).await;
        let mut cfg = config(http, ws);
        cfg.heartbeat_interval = Duration::from_millis(100);

        let (mut ctx, _events) = QuoteContext::try_new(cfg).await.unwrap();
        let heartbeat = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (_, frame) = seen.recv().await.unwrap();
                if frame["cmd"] == "heartbeat" {
                    break frame;
                }
            }
        })
        .await
        .expect("no heartbeat sent");
        assert!(heartbeat["id"].as_u64().is_some());
        ctx.close().await;
    }

    #[tokio::test]
    async fn silent_server_is_disconnected() {
        let http = otp_server().await;
        let (ws, _seen) = ws_server(MockBehavior { silent_after_auth: true, ..Default::default() }).await;
        let mut cfg = config(http, ws);
        cfg.heartbeat_interval = Duration::from_millis(100);

        let (mut ctx, mut events) = QuoteContext::try_new(cfg).await.unwrap();
        assert_eq!(next_event(&mut events).await, PushEvent::Connected);
        match next_event(&mut events).await {
            PushEvent::Disconnected { reason } => assert!(reason.contains("no data from server"), "{reason}"),
            other => panic!("expected disconnect, got {other:?}"),
        }
        ctx.close().await;
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let http = otp_server().await;
        let (ws, _seen) = ws_server(MockBehavior { silent_after_auth: true, ..Default::default() }).await;
        let mut cfg = config(http, ws);
        cfg.request_timeout = Duration::from_millis(300);

        let (mut ctx, _events) = QuoteContext::try_new(cfg).await.unwrap();
        match ctx.quote(vec![sym("AAPL.US")]).await {
            Err(LpError::Timeout(name)) => assert_eq!(name, "quote"),
            other => panic!("expected timeout, got {other:?}"),
        }
        ctx.close().await;
    }
}
