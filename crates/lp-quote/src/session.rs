//! Quote socket session. Owns the WebSocket and all protocol state.
//!
//! A session runs as one tokio task that:
//! 1. Fetches an OTP over HTTP and connects to the quote WebSocket.
//! 2. Authenticates with the OTP and re-sends every active subscription.
//! 3. Reads frames: responses complete pending requests, pushes become
//!    [`PushEvent`]s.
//! 4. Sends heartbeats and drops the socket if the server goes silent.
//! 5. Reconnects with exponential backoff, serving subscription changes
//!    offline in the meantime.
//!
//! The [`QuoteContext`](crate::QuoteContext) talks to the task over an `mpsc`
//! command channel, so no state is shared behind locks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use lp_core::config::QuoteConfig;
use lp_core::ws::{Backoff, WsStream, connect_ws};
use lp_core::{LpError, LpResult, SubType, Symbol};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::event::{PushEvent, PushEventSender};
use crate::http::HttpClient;
use crate::protocol::{self, Command, Frame};

/// The server is considered gone after this many silent heartbeat periods.
const SILENT_HEARTBEATS: u32 = 3;

type WsSink = SplitSink<WsStream, Message>;

/// One-shot reply to a context call.
pub(crate) type Reply<T> = oneshot::Sender<LpResult<T>>;

/// Messages from the context to the session task.
pub(crate) enum SessionCommand {
    /// Send a request and reply with the response `data`.
    Request { command: Command, reply: Reply<Value> },
    /// Report the current subscription state.
    Subscriptions { reply: oneshot::Sender<Vec<(Symbol, Vec<SubType>)>> },
}

/// A request awaiting its response. Resubscribes have no caller to reply to.
struct Pending {
    command: Command,
    reply: Option<Reply<Value>>,
}

enum Exit {
    Shutdown,
    Disconnected(String),
}

pub(crate) struct Session {
    config: QuoteConfig,
    http: HttpClient,
    events: PushEventSender,
    /// Acknowledged subscriptions; restored after every reconnect.
    subscriptions: BTreeMap<Symbol, BTreeSet<SubType>>,
    pending: HashMap<u64, Pending>,
    next_id: u64,
}

impl Session {
    pub(crate) fn new(config: QuoteConfig, http: HttpClient, events: PushEventSender) -> Self {
        Self { config, http, events, subscriptions: BTreeMap::new(), pending: HashMap::new(), next_id: 0 }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn emit(&self, event: PushEvent) {
        if self.events.send(event).is_err() {
            debug!("[quote-session] event receiver dropped");
        }
    }

    // -----------------------------------------------------------------------
    // Connect + handshake
    // -----------------------------------------------------------------------

    /// Fetch an OTP, open the socket, authenticate and resubscribe.
    pub(crate) async fn connect(&mut self) -> LpResult<WsStream> {
        let otp = self.http.get_otp().await?;

        info!("[quote-session] connecting to {}", self.config.quote_ws_url);
        let headers = HashMap::new();
        let connect = connect_ws(&self.config.quote_ws_url, &headers);
        let mut ws = tokio::time::timeout(self.config.request_timeout, connect)
            .await
            .map_err(|_| LpError::Timeout(format!("connect to {}", self.config.quote_ws_url)))??;

        self.authenticate(&mut ws, otp).await?;
        if let Err(e) = self.resubscribe(&mut ws).await {
            self.pending.clear();
            return Err(e);
        }
        Ok(ws)
    }

    async fn authenticate(&mut self, ws: &mut WsStream, otp: String) -> LpResult<()> {
        let id = self.next_id();
        let frame = protocol::encode_request(id, &Command::Auth { otp })?;
        ws.send(Message::Text(frame.into())).await?;

        tokio::time::timeout(self.config.request_timeout, read_auth_ack(ws, id))
            .await
            .map_err(|_| LpError::Timeout("auth".into()))??;
        debug!("[quote-session] authenticated");
        Ok(())
    }

    /// Send one subscribe request per distinct set of sub types.
    async fn resubscribe(&mut self, ws: &mut WsStream) -> LpResult<()> {
        let mut groups: BTreeMap<Vec<SubType>, Vec<Symbol>> = BTreeMap::new();
        for (symbol, types) in &self.subscriptions {
            groups.entry(types.iter().copied().collect()).or_default().push(symbol.clone());
        }

        for (sub_types, symbols) in groups {
            info!("[quote-session] resubscribing {} symbol(s) to {sub_types:?}", symbols.len());
            let command = Command::Subscribe { symbols, sub_types, is_first_push: true };
            let id = self.next_id();
            ws.send(Message::Text(protocol::encode_request(id, &command)?.into())).await?;
            self.pending.insert(id, Pending { command, reply: None });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until shutdown, reconnecting whenever the socket drops.
    ///
    /// `first` is the already-authenticated socket from the initial connect.
    pub(crate) async fn run(
        mut self,
        first: WsStream,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::default();
        let mut next = Some(first);

        loop {
            if *shutdown_rx.borrow() {
                info!("[quote-session] shutdown requested");
                return;
            }

            let ws = match next.take() {
                Some(ws) => ws,
                None => {
                    let attempt = tokio::select! {
                        r = self.connect() => r,
                        _ = shutdown_rx.changed() => return,
                    };
                    match attempt {
                        Ok(ws) => {
                            backoff.reset();
                            ws
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            error!("[quote-session] connect failed: {e}, retrying in {delay:?}");
                            self.emit(PushEvent::Error { message: format!("connect failed: {e}") });
                            if self.wait_offline(delay, &mut cmd_rx, &mut shutdown_rx).await {
                                return;
                            }
                            continue;
                        }
                    }
                }
            };

            info!("[quote-session] connected ({} symbol(s) subscribed)", self.subscriptions.len());
            self.emit(PushEvent::Connected);

            match self.drive(ws, &mut cmd_rx, &mut shutdown_rx).await {
                Exit::Shutdown => {
                    info!("[quote-session] stopped");
                    return;
                }
                Exit::Disconnected(reason) => {
                    let delay = backoff.next_delay();
                    warn!("[quote-session] disconnected ({reason}), reconnecting in {delay:?}");
                    self.emit(PushEvent::Disconnected { reason });
                    if self.wait_offline(delay, &mut cmd_rx, &mut shutdown_rx).await {
                        return;
                    }
                }
            }
        }
    }

    /// Read/write loop for one connected socket.
    async fn drive(
        &mut self,
        ws: WsStream,
        cmd_rx: &mut mpsc::Receiver<SessionCommand>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Exit {
        let (mut ws_write, mut ws_read) = ws.split();
        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[quote-session] shutdown signal received");
                    let _ = ws_write.close().await;
                    self.fail_pending(|| LpError::Closed);
                    return Exit::Shutdown;
                }

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // Every context handle is gone.
                        let _ = ws_write.close().await;
                        return Exit::Shutdown;
                    };
                    if let Some(reason) = self.handle_online(cmd, &mut ws_write).await {
                        return self.disconnected(reason);
                    }
                }

                msg = ws_read.next() => {
                    last_inbound = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!("[quote-session] unexpected binary frame ({} bytes)", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return self.disconnected(format!("server closed the socket: {frame:?}"));
                        }
                        Some(Err(e)) => return self.disconnected(format!("read error: {e}")),
                        None => return self.disconnected("stream ended".into()),
                        _ => {} // Pong, Frame
                    }
                }

                _ = heartbeat.tick() => {
                    self.prune_abandoned();
                    let silent = last_inbound.elapsed();
                    if silent > period * SILENT_HEARTBEATS {
                        return self.disconnected(format!("no data from server for {silent:?}"));
                    }
                    let id = self.next_id();
                    match protocol::encode_request(id, &Command::Heartbeat) {
                        Ok(frame) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                return self.disconnected(format!("heartbeat send error: {e}"));
                            }
                        }
                        Err(e) => error!("[quote-session] failed to encode heartbeat: {e}"),
                    }
                }
            }
        }
    }

    /// Serve commands while disconnected until `delay` elapses.
    ///
    /// Returns `true` if shutdown was requested.
    async fn wait_offline(
        &mut self,
        delay: Duration,
        cmd_rx: &mut mpsc::Receiver<SessionCommand>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                _ = shutdown_rx.changed() => return true,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_offline(cmd),
                    None => return true,
                },
            }
        }
    }

    // -----------------------------------------------------------------------
    // Command handling
    // -----------------------------------------------------------------------

    /// Returns a disconnect reason if the socket failed.
    async fn handle_online(&mut self, cmd: SessionCommand, ws_write: &mut WsSink) -> Option<String> {
        let (command, reply) = match cmd {
            SessionCommand::Subscriptions { reply } => {
                let _ = reply.send(self.subscription_list());
                return None;
            }
            SessionCommand::Request { command, reply } => (command, reply),
        };
        if abandoned(&reply, &command) {
            return None;
        }

        let id = self.next_id();
        let frame = match protocol::encode_request(id, &command) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply.send(Err(e));
                return None;
            }
        };

        debug!("[quote-session] -> {} (id={id})", command.name());
        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
            let _ = reply.send(Err(LpError::WebSocket(format!("send failed: {e}"))));
            return Some(format!("send error: {e}"));
        }
        self.pending.insert(id, Pending { command, reply: Some(reply) });
        None
    }

    /// Subscription changes are recorded and sent on the next connect; other
    /// requests need a live socket.
    fn handle_offline(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Subscriptions { reply } => {
                let _ = reply.send(self.subscription_list());
            }
            SessionCommand::Request { command, reply } => {
                if abandoned(&reply, &command) {
                    return;
                }
                match command {
                    Command::Subscribe { .. } | Command::Unsubscribe { .. } => {
                        debug!("[quote-session] recording {} while offline", command.name());
                        self.apply_ack(&command);
                        let _ = reply.send(Ok(Value::Null));
                    }
                    other => {
                        let err = LpError::WebSocket(format!("not connected, cannot send {}", other.name()));
                        let _ = reply.send(Err(err));
                    }
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match protocol::parse_frame(text) {
            Ok(Frame::Response { id, code, message, data }) => self.complete(id, code, message, data),
            Ok(Frame::Quote { symbol, quote }) => self.emit(PushEvent::Quote { symbol, quote }),
            Ok(Frame::Heartbeat) => {}
            Ok(Frame::Unhandled { cmd }) => debug!("[quote-session] ignoring push '{cmd}'"),
            Err(e) => warn!("[quote-session] dropping frame: {e}"),
        }
    }

    fn complete(&mut self, id: u64, code: i64, message: String, data: Value) {
        let Some(pending) = self.pending.remove(&id) else {
            // Heartbeat acks land here.
            debug!("[quote-session] response for untracked request id={id}");
            return;
        };

        let result = if code == 0 {
            self.apply_ack(&pending.command);
            Ok(data)
        } else {
            Err(LpError::Request { code, message })
        };

        match pending.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!("[quote-session] {} failed: {e}", pending.command.name());
                    self.emit(PushEvent::Error { message: format!("{} failed: {e}", pending.command.name()) });
                }
            }
        }
    }

    /// Record an acknowledged subscribe/unsubscribe.
    fn apply_ack(&mut self, command: &Command) {
        match command {
            Command::Subscribe { symbols, sub_types, .. } => {
                for symbol in symbols {
                    self.subscriptions.entry(symbol.clone()).or_default().extend(sub_types.iter().copied());
                }
            }
            Command::Unsubscribe { symbols, sub_types } => {
                for symbol in symbols {
                    if let Some(types) = self.subscriptions.get_mut(symbol) {
                        for t in sub_types {
                            types.remove(t);
                        }
                        if types.is_empty() {
                            self.subscriptions.remove(symbol);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn subscription_list(&self) -> Vec<(Symbol, Vec<SubType>)> {
        self.subscriptions.iter().map(|(s, types)| (s.clone(), types.iter().copied().collect())).collect()
    }

    /// Forget requests whose caller stopped waiting. Resubscribes are kept
    /// until the server answers them.
    fn prune_abandoned(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.reply.as_ref().is_none_or(|reply| !reply.is_closed()));
        let pruned = before - self.pending.len();
        if pruned > 0 {
            debug!("[quote-session] pruned {pruned} abandoned request(s)");
        }
    }

    fn disconnected(&mut self, reason: String) -> Exit {
        let msg = format!("connection lost: {reason}");
        self.fail_pending(|| LpError::WebSocket(msg.clone()));
        Exit::Disconnected(reason)
    }

    fn fail_pending(&mut self, make_err: impl Fn() -> LpError) {
        for (_, pending) in self.pending.drain() {
            if let Some(reply) = pending.reply {
                let _ = reply.send(Err(make_err()));
            }
        }
    }
}

/// The caller timed out or dropped the call before the session got to it.
fn abandoned(reply: &Reply<Value>, command: &Command) -> bool {
    if reply.is_closed() {
        debug!("[quote-session] dropping {} whose caller stopped waiting", command.name());
        return true;
    }
    false
}

/// Read frames until the response to the auth request `id` arrives.
async fn read_auth_ack(ws: &mut WsStream, id: u64) -> LpResult<()> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => match protocol::parse_frame(&text) {
                Ok(Frame::Response { id: resp_id, code, message, .. }) if resp_id == id => {
                    if code != 0 {
                        return Err(LpError::Auth(format!("code {code}: {message}")));
                    }
                    return Ok(());
                }
                Ok(other) => debug!("[quote-session] ignoring frame before auth ack: {other:?}"),
                Err(e) => warn!("[quote-session] bad frame during auth: {e}"),
            },
            Message::Close(frame) => {
                return Err(LpError::WebSocket(format!("closed during auth: {frame:?}")));
            }
            _ => {}
        }
    }
    Err(LpError::WebSocket("stream ended during auth".into()))
}
