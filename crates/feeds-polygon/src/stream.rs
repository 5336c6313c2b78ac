//! WebSocket subscription manager.
//!
//! [`StreamManager`] owns at most one live connection and drives it through
//! a small state machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Connected
//!      ^                          ^                    |
//!      |                          |                  close
//!      +----- give up ------ Reconnecting <------------+
//! ```
//!
//! On every open the manager authenticates and replays the live symbol set,
//! so subscriptions survive reconnects. The n-th consecutive reconnect waits
//! `base_delay * 2^n`; after `max_attempts` failures the manager stays
//! disconnected until [`connect`](StreamManager::connect) is called again.

use std::collections::BTreeSet;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feeds_core::{Aggregate, FeedError, Quote, Result, Symbol, Trade};
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{Channel, ReconnectPolicy};

/// Outbound half of a connection.
pub type MessageSink = Pin<Box<dyn Sink<String, Error = FeedError> + Send>>;

/// Inbound half of a connection. Ends when the peer closes.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens text-message connections.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Connect to `url` and return the split connection.
    async fn connect(&self, url: &str) -> Result<(MessageSink, MessageStream)>;
}

/// Production connector over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(MessageSink, MessageStream)> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| FeedError::Transport(format!("WebSocket connect failed: {e}")))?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| FeedError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, FeedError>(Message::Text(text))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(FeedError::Transport(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no reconnect pending.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and authenticated.
    Connected,
    /// Waiting for the backoff timer.
    Reconnecting,
}

type TradeHandler = Arc<dyn Fn(&Trade) + Send + Sync>;
type QuoteHandler = Arc<dyn Fn(&Quote) + Send + Sync>;
type AggregateHandler = Arc<dyn Fn(&Aggregate) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: u64,
    trades: Vec<(u64, TradeHandler)>,
    quotes: Vec<(u64, QuoteHandler)>,
    aggregates: Vec<(u64, AggregateHandler)>,
}

impl Handlers {
    fn remove(&mut self, id: u64) {
        self.trades.retain(|(h, _)| *h != id);
        self.quotes.retain(|(h, _)| *h != id);
        self.aggregates.retain(|(h, _)| *h != id);
    }
}

enum Outbound {
    Text(String),
    Close,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    symbols: BTreeSet<Symbol>,
    attempts: u32,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reconnect: Option<JoinHandle<()>>,
    // bumped by connect() and disconnect(); stale tasks compare and bail
    generation: u64,
}

struct Inner {
    url: String,
    api_key: String,
    channels: Vec<Channel>,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    shared: Mutex<Shared>,
    handlers: Mutex<Handlers>,
}

impl Inner {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn action(&self, action: &str, symbol: &Symbol) -> String {
        let params = self
            .channels
            .iter()
            .map(|c| format!("{}.{}", c.prefix(), symbol))
            .collect::<Vec<_>>()
            .join(",");
        json!({"action": action, "params": params}).to_string()
    }

    /// Runs one connection until it closes, then schedules a reconnect.
    async fn run(self: Arc<Self>, generation: u64) {
        let (mut sink, mut stream) = match self.connector.connect(&self.url).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Stream connection failed");
                self.connection_lost(generation);
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut shared = self.shared();
            if shared.generation != generation {
                return;
            }
            shared.state = ConnectionState::Connected;
            shared.attempts = 0;

            let auth = json!({"action": "auth", "params": self.api_key}).to_string();
            let _ = tx.send(Outbound::Text(auth));
            for symbol in &shared.symbols {
                let _ = tx.send(Outbound::Text(self.action("subscribe", symbol)));
            }
            info!(url = %self.url, replayed = shared.symbols.len(), "Stream connected");
            shared.outbound = Some(tx);
        }

        loop {
            tokio::select! {
                out = rx.recv() => match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(text).await {
                            warn!(error = %e, "Stream send failed");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        info!(url = %self.url, "Stream closed");
                        return;
                    }
                },
                msg = stream.next() => match msg {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => {
                        warn!(error = %e, "Stream error");
                        break;
                    }
                    None => {
                        info!(url = %self.url, "Stream closed by peer");
                        break;
                    }
                },
            }
        }

        self.connection_lost(generation);
    }

    fn connection_lost(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared();
        if shared.generation != generation {
            return;
        }
        shared.outbound = None;

        if shared.attempts >= self.policy.max_attempts {
            shared.state = ConnectionState::Disconnected;
            warn!(
                attempts = shared.attempts,
                "Stream reconnect attempts exhausted, giving up"
            );
            return;
        }

        shared.attempts += 1;
        shared.state = ConnectionState::Reconnecting;
        let delay = self.policy.delay_for(shared.attempts);
        info!(
            attempt = shared.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling stream reconnect"
        );

        let inner = Arc::clone(self);
        shared.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut shared = inner.shared();
                if shared.generation != generation {
                    return;
                }
                shared.reconnect = None;
                shared.state = ConnectionState::Connecting;
            }
            inner.run(generation).await;
        }));
    }

    fn dispatch(&self, text: &str) {
        let payload: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Dropping malformed stream message");
                return;
            }
        };

        match payload {
            Value::Array(events) => events.iter().for_each(|e| self.route(e)),
            event => self.route(&event),
        }
    }

    fn route(&self, event: &Value) {
        let ev = event.get("ev").and_then(Value::as_str).unwrap_or_default();
        match ev {
            "T" => match parse::<WireTrade>(event).and_then(WireTrade::into_trade) {
                Some(trade) => {
                    let handlers = snapshot(&self.handlers().trades);
                    handlers.iter().for_each(|h| h(&trade));
                }
                None => warn!(ev, "Dropping malformed trade event"),
            },
            "Q" => match parse::<WireQuote>(event).and_then(WireQuote::into_quote) {
                Some(quote) => {
                    let handlers = snapshot(&self.handlers().quotes);
                    handlers.iter().for_each(|h| h(&quote));
                }
                None => warn!(ev, "Dropping malformed quote event"),
            },
            "A" | "AM" => match parse::<WireAggregate>(event)
                .and_then(WireAggregate::into_aggregate)
            {
                Some(agg) => {
                    let handlers = snapshot(&self.handlers().aggregates);
                    handlers.iter().for_each(|h| h(&agg));
                }
                None => warn!(ev, "Dropping malformed aggregate event"),
            },
            "status" => {
                let status = event.get("status").and_then(Value::as_str).unwrap_or_default();
                let message = event.get("message").and_then(Value::as_str).unwrap_or_default();
                if status == "auth_failed" {
                    warn!(status, message, "Stream authentication failed");
                } else {
                    debug!(status, message, "Stream status");
                }
            }
            other => debug!(ev = other, "Ignoring unknown stream event"),
        }
    }
}

/// Manages one streaming connection and its subscriptions.
///
/// Dropping the manager disconnects.
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared();
        f.debug_struct("StreamManager")
            .field("url", &self.inner.url)
            .field("api_key", &"[REDACTED]")
            .field("state", &shared.state)
            .field("subscriptions", &shared.symbols.len())
            .finish()
    }
}

impl StreamManager {
    /// Create a disconnected manager.
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        channels: Vec<Channel>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                api_key: api_key.into(),
                channels,
                policy,
                connector,
                shared: Mutex::new(Shared::default()),
                handlers: Mutex::new(Handlers::default()),
            }),
        }
    }

    /// Open the connection.
    ///
    /// No-op while connected or connecting. Otherwise cancels any pending
    /// reconnect and starts over with a fresh attempt counter.
    pub fn connect(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| FeedError::Unavailable("streaming requires a tokio runtime".to_string()))?;

        let generation = {
            let mut shared = self.inner.shared();
            if matches!(
                shared.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                return Ok(());
            }
            if let Some(timer) = shared.reconnect.take() {
                timer.abort();
            }
            shared.attempts = 0;
            shared.generation += 1;
            shared.state = ConnectionState::Connecting;
            shared.generation
        };

        info!(url = %self.inner.url, "Connecting stream");
        let _ = runtime.spawn(Arc::clone(&self.inner).run(generation));
        Ok(())
    }

    /// Close the connection, cancel any reconnect and clear subscriptions.
    pub fn disconnect(&self) {
        let mut shared = self.inner.shared();
        shared.generation += 1;
        if let Some(timer) = shared.reconnect.take() {
            timer.abort();
        }
        if let Some(tx) = shared.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
        shared.symbols.clear();
        shared.attempts = 0;
        shared.state = ConnectionState::Disconnected;
    }

    /// Add `symbol` to the live set.
    ///
    /// Sent immediately when connected, otherwise on the next open.
    pub fn subscribe(&self, symbol: impl Into<Symbol>) -> Result<()> {
        let symbol = require(symbol.into())?;
        let mut shared = self.inner.shared();
        if shared.symbols.insert(symbol.clone()) && shared.state == ConnectionState::Connected {
            if let Some(tx) = &shared.outbound {
                let _ = tx.send(Outbound::Text(self.inner.action("subscribe", &symbol)));
            }
        }
        debug!(symbol = %symbol, "Subscribed");
        Ok(())
    }

    /// Remove `symbol` from the live set. Idempotent.
    pub fn unsubscribe(&self, symbol: impl Into<Symbol>) -> Result<()> {
        let symbol = require(symbol.into())?;
        let mut shared = self.inner.shared();
        if shared.symbols.remove(&symbol) && shared.state == ConnectionState::Connected {
            if let Some(tx) = &shared.outbound {
                let _ = tx.send(Outbound::Text(self.inner.action("unsubscribe", &symbol)));
            }
            debug!(symbol = %symbol, "Unsubscribed");
        }
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared().state
    }

    /// True when connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive failed reconnects so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared().attempts
    }

    /// The live symbol set, sorted.
    pub fn subscriptions(&self) -> Vec<Symbol> {
        self.inner.shared().symbols.iter().cloned().collect()
    }

    /// Register a trade handler.
    pub fn on_trade(&self, handler: impl Fn(&Trade) + Send + Sync + 'static) -> HandlerHandle {
        let mut handlers = self.inner.handlers();
        let id = next_id(&mut handlers);
        handlers.trades.push((id, Arc::new(handler)));
        self.handle(id)
    }

    /// Register a quote handler.
    pub fn on_quote(&self, handler: impl Fn(&Quote) + Send + Sync + 'static) -> HandlerHandle {
        let mut handlers = self.inner.handlers();
        let id = next_id(&mut handlers);
        handlers.quotes.push((id, Arc::new(handler)));
        self.handle(id)
    }

    /// Register an aggregate handler.
    pub fn on_aggregate(
        &self,
        handler: impl Fn(&Aggregate) + Send + Sync + 'static,
    ) -> HandlerHandle {
        let mut handlers = self.inner.handlers();
        let id = next_id(&mut handlers);
        handlers.aggregates.push((id, Arc::new(handler)));
        self.handle(id)
    }

    fn handle(&self, id: u64) -> HandlerHandle {
        HandlerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Registration returned by the `on_*` methods.
///
/// Dropping the handle keeps the handler registered.
#[derive(Debug)]
pub struct HandlerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl HandlerHandle {
    /// Unregister the handler.
    pub fn remove(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handlers().remove(self.id);
        }
    }
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner").field("url", &self.url).finish_non_exhaustive()
    }
}

fn next_id(handlers: &mut Handlers) -> u64 {
    handlers.next_id += 1;
    handlers.next_id
}

fn require(symbol: Symbol) -> Result<Symbol> {
    if symbol.is_empty() {
        return Err(FeedError::InvalidParameter("symbol is empty".to_string()));
    }
    Ok(symbol)
}

/// Clones the registered handlers so none run under the lock.
fn snapshot<H: Clone>(entries: &[(u64, H)]) -> Vec<H> {
    entries.iter().map(|(_, h)| h.clone()).collect()
}

fn parse<T: for<'de> Deserialize<'de>>(event: &Value) -> Option<T> {
    T::deserialize(event).ok()
}

fn millis(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts)
}

#[derive(Deserialize)]
struct WireTrade {
    sym: String,
    p: f64,
    s: f64,
    #[serde(default)]
    x: Option<i64>,
    #[serde(default)]
    c: Vec<i64>,
    t: i64,
}

impl WireTrade {
    fn into_trade(self) -> Option<Trade> {
        Some(Trade {
            symbol: Symbol::new(self.sym),
            price: self.p,
            size: self.s,
            exchange: self.x,
            conditions: self.c,
            timestamp: millis(self.t)?,
        })
    }
}

#[derive(Deserialize)]
struct WireQuote {
    sym: String,
    bp: f64,
    #[serde(default)]
    bs: f64,
    ap: f64,
    #[serde(rename = "as", default)]
    ask_size: f64,
    t: i64,
}

impl WireQuote {
    fn into_quote(self) -> Option<Quote> {
        Some(Quote {
            symbol: Symbol::new(self.sym),
            bid_price: self.bp,
            bid_size: self.bs,
            ask_price: self.ap,
            ask_size: self.ask_size,
            timestamp: millis(self.t)?,
        })
    }
}

#[derive(Deserialize)]
struct WireAggregate {
    sym: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
    s: i64,
    e: i64,
}

impl WireAggregate {
    fn into_aggregate(self) -> Option<Aggregate> {
        Some(Aggregate {
            symbol: Symbol::new(self.sym),
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
            vwap: self.vw,
            start: millis(self.s)?,
            end: millis(self.e)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Records every connection attempt and every message sent on it.
    #[derive(Debug, Default)]
    struct FakeConnector {
        fail: bool,
        attempts: Mutex<Vec<Instant>>,
        sent: Arc<Mutex<Vec<(usize, String)>>>,
        peers: Mutex<Vec<fmpsc::UnboundedSender<Result<String>>>>,
    }

    impl FakeConnector {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        fn working() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn sent_on(&self, conn: usize) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == conn)
                .map(|(_, m)| m.clone())
                .collect()
        }

        fn push(&self, conn: usize, text: &str) {
            self.peers.lock().unwrap()[conn]
                .unbounded_send(Ok(text.to_string()))
                .unwrap();
        }

        fn hang_up(&self, conn: usize) {
            self.peers.lock().unwrap()[conn].close_channel();
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<(MessageSink, MessageStream)> {
            self.attempts.lock().unwrap().push(Instant::now());
            if self.fail {
                return Err(FeedError::Transport("connection refused".to_string()));
            }

            let (tx, rx) = fmpsc::unbounded();
            let conn = {
                let mut peers = self.peers.lock().unwrap();
                peers.push(tx);
                peers.len() - 1
            };

            let sink =
                futures::sink::unfold(Arc::clone(&self.sent), move |sent, msg: String| async move {
                    sent.lock().unwrap().push((conn, msg));
                    Ok::<_, FeedError>(sent)
                });
            Ok((Box::pin(sink), Box::pin(rx)))
        }
    }

    fn manager(connector: Arc<FakeConnector>, base_delay_ms: u64) -> StreamManager {
        StreamManager::new(
            "wss://example.test/stocks",
            "stream-key",
            Channel::ALL.to_vec(),
            ReconnectPolicy {
                base_delay_ms,
                max_attempts: 5,
            },
            connector,
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_give_up() {
        let connector = FakeConnector::failing();
        let manager = manager(Arc::clone(&connector), 100);

        manager.connect().unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let attempts = connector.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 6, "initial attempt plus 5 reconnects");
        for (n, pair) in attempts.windows(2).enumerate() {
            let expected = Duration::from_millis(100 * 2u64.pow(n as u32 + 1));
            let gap = pair[1] - pair[0];
            assert!(gap >= expected, "gap {n}: {gap:?} < {expected:?}");
            assert!(gap < expected + Duration::from_millis(10), "gap {n}: {gap:?}");
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_after_give_up_restarts() {
        let connector = FakeConnector::failing();
        let manager = manager(Arc::clone(&connector), 10);

        manager.connect().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts.lock().unwrap().len(), 6);

        manager.connect().unwrap();
        settle().await;
        assert_eq!(connector.attempts.lock().unwrap().len(), 7);
        assert_eq!(manager.reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_then_subscribe() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);

        manager.connect().unwrap();
        settle().await;
        assert!(manager.is_connected());

        manager.subscribe("aapl").unwrap();
        settle().await;

        assert_eq!(
            connector.sent_on(0),
            vec![
                r#"{"action":"auth","params":"stream-key"}"#.to_string(),
                r#"{"action":"subscribe","params":"T.AAPL,Q.AAPL,A.AAPL"}"#.to_string(),
            ]
        );
        assert_eq!(manager.subscriptions(), vec![Symbol::new("AAPL")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_replayed_after_reconnect() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);

        manager.subscribe("MSFT").unwrap();
        manager.connect().unwrap();
        settle().await;
        manager.subscribe("AAPL").unwrap();
        settle().await;

        connector.hang_up(0);
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(manager.reconnect_attempts(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);

        let replay = connector.sent_on(1);
        assert_eq!(replay.len(), 3);
        assert!(replay[0].contains("\"auth\""));
        for subscribe in [
            r#"{"action":"subscribe","params":"T.AAPL,Q.AAPL,A.AAPL"}"#,
            r#"{"action":"subscribe","params":"T.MSFT,Q.MSFT,A.MSFT"}"#,
        ] {
            assert!(replay.iter().any(|m| m == subscribe), "missing {subscribe}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_only_when_present() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);
        manager.connect().unwrap();
        settle().await;

        manager.unsubscribe("TSLA").unwrap();
        manager.subscribe("TSLA").unwrap();
        manager.unsubscribe("TSLA").unwrap();
        manager.unsubscribe("TSLA").unwrap();
        settle().await;

        let sent = connector.sent_on(0);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2], r#"{"action":"unsubscribe","params":"T.TSLA,Q.TSLA,A.TSLA"}"#);
        assert!(manager.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connected() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);
        manager.connect().unwrap();
        manager.connect().unwrap();
        settle().await;
        manager.connect().unwrap();
        settle().await;
        assert_eq!(connector.attempts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_reconnecting() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);
        manager.subscribe("AAPL").unwrap();
        manager.connect().unwrap();
        settle().await;

        connector.hang_up(0);
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.attempts.lock().unwrap().len(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_dispatched_to_handlers() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);

        let trades = Arc::new(Mutex::new(Vec::new()));
        let quotes = Arc::new(Mutex::new(Vec::new()));
        let aggs = Arc::new(Mutex::new(Vec::new()));
        {
            let trades = Arc::clone(&trades);
            manager.on_trade(move |t| trades.lock().unwrap().push(t.clone()));
            let quotes = Arc::clone(&quotes);
            manager.on_quote(move |q| quotes.lock().unwrap().push(q.clone()));
            let aggs = Arc::clone(&aggs);
            manager.on_aggregate(move |a| aggs.lock().unwrap().push(a.clone()));
        }

        manager.connect().unwrap();
        settle().await;

        connector.push(0, r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#);
        connector.push(
            0,
            r#"[
                {"ev":"T","sym":"AAPL","x":4,"p":190.5,"s":100,"c":[12,37],"t":1700000000000},
                {"ev":"Q","sym":"AAPL","bp":190.4,"bs":3,"ap":190.6,"as":5,"t":1700000000001},
                {"ev":"XX","sym":"AAPL"},
                {"ev":"T","sym":"AAPL"}
            ]"#,
        );
        connector.push(
            0,
            r#"{"ev":"AM","sym":"MSFT","o":370.0,"h":371.2,"l":369.8,"c":371.0,"v":12000,"vw":370.6,"s":1700000000000,"e":1700000060000}"#,
        );
        connector.push(0, "not json");
        settle().await;

        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 190.5);
        assert_eq!(trades[0].conditions, vec![12, 37]);

        let quotes = quotes.lock().unwrap();
        assert_eq!(quotes.len(), 1);
        assert!((quotes[0].mid() - 190.5).abs() < 1e-9);

        let aggs = aggs.lock().unwrap();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].symbol, Symbol::new("MSFT"));
        assert_eq!(aggs[0].vwap, Some(370.6));

        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_handler_not_called() {
        let connector = FakeConnector::working();
        let manager = manager(Arc::clone(&connector), 100);
        let count = Arc::new(Mutex::new(0));

        let handle = {
            let count = Arc::clone(&count);
            manager.on_trade(move |_| *count.lock().unwrap() += 1)
        };
        manager.connect().unwrap();
        settle().await;

        let trade = r#"{"ev":"T","sym":"AAPL","p":1.0,"s":1,"t":1700000000000}"#;
        connector.push(0, trade);
        settle().await;
        handle.remove();
        connector.push(0, trade);
        settle().await;

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_connect_outside_runtime_is_unavailable() {
        let manager = manager(FakeConnector::working(), 100);
        let err = manager.connect().unwrap_err();
        assert!(matches!(err, FeedError::Unavailable(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let manager = manager(FakeConnector::working(), 100);
        assert!(matches!(manager.subscribe("  "), Err(FeedError::InvalidParameter(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let manager = manager(FakeConnector::working(), 100);
        let debug_str = format!("{manager:?}");
        assert!(!debug_str.contains("stream-key"));
    }
}
