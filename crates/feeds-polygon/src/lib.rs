#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Polygon.io data provider.
//!
//! This crate implements the feeds-core [`Provider`] trait for the
//! [Polygon.io](https://polygon.io/) REST API and adds streaming controls over
//! its WebSocket feed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use feeds_polygon::PolygonProvider;
//! use feeds_core::{PriceRange, Provider, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = PolygonProvider::new("your_api_key")?;
//!
//!     let prices = provider.get_prices(&Symbol::new("AAPL"), PriceRange::OneMonth).await?;
//!
//!     provider.on_trade(|trade| println!("{} @ {}", trade.symbol, trade.price));
//!     provider.subscribe_to_symbol("AAPL")?;
//!     provider.connect_websocket()?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod models;
pub mod rest;
pub mod stream;

pub use config::{Channel, DEFAULT_REST_BASE_URL, DEFAULT_WS_URL, PolygonConfig, ReconnectPolicy};
pub use rest::RestClient;
pub use stream::{
    ConnectionState, Connector, HandlerHandle, MessageSink, MessageStream, StreamManager,
    TungsteniteConnector,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feeds_core::credentials::is_placeholder;
use feeds_core::validate::{validate_financials, validate_kpis, validate_prices};
use feeds_core::{
    Aggregate, FeedError, FinancialsSnapshot, KpiSnapshot, PricePoint, PriceRange, Provider,
    ProviderKind, Quote, Result, Symbol, Trade,
};
use reqwest::Client;
use tracing::{debug, warn};

/// Name the Polygon provider reports.
pub const POLYGON_PROVIDER_NAME: &str = "polygon";

/// Polygon.io data provider.
///
/// Provides access to:
/// - Historical aggregates for every [`PriceRange`]
/// - Snapshot quotes with company market cap
/// - Reported financials
/// - Streaming trades, quotes and aggregates
pub struct PolygonProvider {
    rest: RestClient,
    stream: StreamManager,
    api_key: String,
    updated: Mutex<HashMap<Symbol, DateTime<Utc>>>,
}

impl fmt::Debug for PolygonProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonProvider")
            .field("api_key", &"[REDACTED]")
            .field("stream", &self.stream.state())
            .finish()
    }
}

impl PolygonProvider {
    /// Create a provider with default configuration.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, PolygonConfig::default())
    }

    /// Create a provider with the given configuration.
    pub fn with_config(api_key: impl Into<String>, config: PolygonConfig) -> Result<Self> {
        let api_key = api_key.into();
        let rest = RestClient::new(api_key.clone(), &config)?;
        Ok(Self::assemble(rest, api_key, &config))
    }

    /// Create a provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>, config: PolygonConfig) -> Self {
        let api_key = api_key.into();
        let rest = RestClient::with_client(client, api_key.clone(), &config);
        Self::assemble(rest, api_key, &config)
    }

    /// Replace the streaming transport.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>, config: &PolygonConfig) -> Self {
        self.stream = stream_manager(&self.api_key, config, connector);
        self
    }

    fn assemble(rest: RestClient, api_key: String, config: &PolygonConfig) -> Self {
        Self {
            rest,
            stream: stream_manager(&api_key, config, Arc::new(TungsteniteConnector)),
            api_key,
            updated: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying subscription manager.
    #[must_use]
    pub const fn stream(&self) -> &StreamManager {
        &self.stream
    }

    /// Open the streaming connection.
    pub fn connect_websocket(&self) -> Result<()> {
        self.stream.connect()
    }

    /// Close the streaming connection and drop all subscriptions.
    pub fn disconnect_websocket(&self) {
        self.stream.disconnect();
    }

    /// True when the stream is connected.
    #[must_use]
    pub fn is_websocket_connected(&self) -> bool {
        self.stream.is_connected()
    }

    /// Subscribe to streaming events for `symbol`.
    pub fn subscribe_to_symbol(&self, symbol: impl Into<Symbol>) -> Result<()> {
        self.stream.subscribe(symbol)
    }

    /// Unsubscribe from streaming events for `symbol`.
    pub fn unsubscribe_from_symbol(&self, symbol: impl Into<Symbol>) -> Result<()> {
        self.stream.unsubscribe(symbol)
    }

    /// Register a trade handler.
    pub fn on_trade(&self, handler: impl Fn(&Trade) + Send + Sync + 'static) -> HandlerHandle {
        self.stream.on_trade(handler)
    }

    /// Register a quote handler.
    pub fn on_quote(&self, handler: impl Fn(&Quote) + Send + Sync + 'static) -> HandlerHandle {
        self.stream.on_quote(handler)
    }

    /// Register an aggregate handler.
    pub fn on_aggregate(
        &self,
        handler: impl Fn(&Aggregate) + Send + Sync + 'static,
    ) -> HandlerHandle {
        self.stream.on_aggregate(handler)
    }

    fn touch(&self, symbol: &Symbol) {
        let mut updated = self.updated.lock().unwrap_or_else(PoisonError::into_inner);
        updated.insert(symbol.clone(), Utc::now());
    }
}

fn stream_manager(
    api_key: &str,
    config: &PolygonConfig,
    connector: Arc<dyn Connector>,
) -> StreamManager {
    StreamManager::new(
        config.ws_url.clone(),
        api_key,
        config.channels.clone(),
        config.reconnect_policy(),
        connector,
    )
}

/// Ticker as it may appear in a URL path.
fn path_symbol(symbol: &Symbol) -> Result<&str> {
    let s = symbol.as_str();
    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':');
    if s.is_empty() || !s.chars().all(valid) {
        return Err(FeedError::InvalidParameter(format!("invalid ticker: {s:?}")));
    }
    Ok(s)
}

#[async_trait]
impl Provider for PolygonProvider {
    fn name(&self) -> &str {
        POLYGON_PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Polygon.io - Real-time and historical stock market data"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Live
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn get_prices(&self, symbol: &Symbol, range: PriceRange) -> Result<Vec<PricePoint>> {
        let ticker = path_symbol(symbol)?;
        let window = range.window(Utc::now().date_naive());
        let endpoint = format!(
            "/v2/aggs/ticker/{ticker}/range/{}/{}/{}/{}",
            window.multiplier,
            window.timespan.as_str(),
            window.from,
            window.to
        );
        let params = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", "50000".to_string()),
        ];

        let body = self.rest.request(&endpoint, &params).await?;
        let points = validate_prices(&models::aggregates_to_prices(&body))?;
        if points.is_empty() {
            return Err(FeedError::NoData {
                symbol: symbol.to_string(),
                range: range.to_string(),
            });
        }

        debug!(
            provider = POLYGON_PROVIDER_NAME,
            symbol = %symbol,
            range = %range,
            points = points.len(),
            "Fetched prices"
        );
        self.touch(symbol);
        Ok(points)
    }

    async fn get_kpis(&self, symbol: &Symbol) -> Result<KpiSnapshot> {
        let ticker = path_symbol(symbol)?;
        let snapshot = self
            .rest
            .request(&format!("/v2/snapshot/locale/us/markets/stocks/tickers/{ticker}"), &[])
            .await?;

        // best-effort: the fields it supplies degrade to None
        let company = self
            .rest
            .request(&format!("/v3/reference/tickers/{ticker}"), &[])
            .await
            .inspect_err(|e| {
                warn!(
                    provider = POLYGON_PROVIDER_NAME,
                    symbol = %symbol,
                    error = %e,
                    "Company details unavailable"
                );
            })
            .ok();

        let doc = models::snapshot_to_kpis(symbol, &snapshot, company.as_ref(), Utc::now())
            .ok_or_else(|| FeedError::NoData {
                symbol: symbol.to_string(),
                range: "snapshot".to_string(),
            })?;
        let kpis = validate_kpis(&doc)?;
        self.touch(symbol);
        Ok(kpis)
    }

    async fn get_financials(&self, symbol: &Symbol) -> Result<FinancialsSnapshot> {
        let ticker = path_symbol(symbol)?;
        let params = [("ticker", ticker.to_string()), ("limit", "1".to_string())];
        let body = self.rest.request("/vX/reference/financials", &params).await?;

        let doc = models::financials_to_snapshot(symbol, &body, Utc::now()).ok_or_else(|| {
            FeedError::NoData {
                symbol: symbol.to_string(),
                range: "financials".to_string(),
            }
        })?;
        let financials = validate_financials(&doc)?;
        self.touch(symbol);
        Ok(financials)
    }

    async fn is_available(&self) -> bool {
        !is_placeholder(&self.api_key)
    }

    async fn is_authenticated(&self) -> Result<bool> {
        if !self.is_available().await {
            return Ok(false);
        }
        match self
            .rest
            .request("/v3/reference/tickers", &[("limit", "1".to_string())])
            .await
        {
            Ok(_) => Ok(true),
            Err(FeedError::Auth { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn last_update(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        let updated = self.updated.lock().unwrap_or_else(PoisonError::into_inner);
        updated.get(symbol).copied()
    }
}
