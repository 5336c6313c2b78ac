#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Host bridge data provider.
//!
//! The host (a desktop shell, a broker gateway, another process) owns the
//! actual data connection and answers named requests. This crate adapts that
//! request/response surface to the [`Provider`] trait.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use feeds_bridge::{BridgeProvider, HostBridge};
//!
//! let provider = BridgeProvider::new(Arc::new(MyHostBridge::connect()?));
//! let kpis = provider.get_kpis(&"AAPL".into()).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feeds_core::validate::{
    validate_financials, validate_kpis, validate_prices, validate_vol_surface,
};
use feeds_core::{
    FeedError, FinancialsSnapshot, KpiSnapshot, PricePoint, PriceRange, Provider, ProviderKind,
    Result, Symbol, VolSurface,
};
use serde_json::{Map, Value, json};
use tracing::debug;

/// Name the bridge provider reports.
pub const BRIDGE_PROVIDER_NAME: &str = "bridge";

/// Bridge method for price series.
pub const METHOD_PRICES: &str = "data:prices";
/// Bridge method for KPI snapshots.
pub const METHOD_KPIS: &str = "data:kpis";
/// Bridge method for volatility surfaces.
pub const METHOD_VOL: &str = "data:vol";
/// Bridge method for financials.
pub const METHOD_FINANCIALS: &str = "data:financials";

/// Request/response channel into the host application.
#[async_trait]
pub trait HostBridge: Send + Sync + fmt::Debug {
    /// Invoke `method` with optional JSON parameters.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;
}

/// Provider that forwards requests to a [`HostBridge`].
pub struct BridgeProvider {
    bridge: Option<Arc<dyn HostBridge>>,
    updated: Mutex<HashMap<Symbol, DateTime<Utc>>>,
}

impl fmt::Debug for BridgeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeProvider")
            .field("bridge", &self.bridge.is_some())
            .finish()
    }
}

impl BridgeProvider {
    /// Create a provider over `bridge`.
    #[must_use]
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self::from_option(Some(bridge))
    }

    /// Create a provider with no host attached; every request fails.
    #[must_use]
    pub fn detached() -> Self {
        Self::from_option(None)
    }

    /// Create a provider over an optional bridge.
    #[must_use]
    pub fn from_option(bridge: Option<Arc<dyn HostBridge>>) -> Self {
        Self {
            bridge,
            updated: Mutex::new(HashMap::new()),
        }
    }

    async fn call(&self, method: &str, symbol: &Symbol, params: Value) -> Result<Value> {
        let bridge = self.bridge.as_ref().ok_or_else(|| {
            FeedError::Unavailable(format!("no host bridge attached for {method}"))
        })?;
        debug!(provider = BRIDGE_PROVIDER_NAME, method, symbol = %symbol, "Bridge request");
        bridge.request(method, Some(params)).await
    }

    fn touch(&self, symbol: &Symbol) {
        let mut updated = self.updated.lock().unwrap_or_else(PoisonError::into_inner);
        updated.insert(symbol.clone(), Utc::now());
    }
}

/// Fill gaps the host is allowed to leave in a snapshot object.
///
/// Missing or null `numeric` fields become 0, a missing timestamp becomes now
/// and a missing symbol becomes the requested one. Values of the wrong type are
/// left alone so validation rejects them.
fn coerce(mut payload: Value, symbol: &Symbol, numeric: &[&str]) -> Value {
    if let Some(obj) = payload.as_object_mut() {
        for key in numeric {
            fill(obj, key, json!(0.0));
        }
        fill(obj, "timestamp", json!(Utc::now().to_rfc3339()));
        fill(obj, "symbol", json!(symbol.as_str()));
    }
    payload
}

/// Same rules applied to each row of a price series.
fn coerce_rows(mut payload: Value) -> Value {
    fill_rows(&mut payload, &["open", "high", "low", "close", "volume"]);
    payload
}

/// Snapshot rules plus per-point defaults for a vol surface.
///
/// `expiry` is left alone, like a price row's `date`.
fn coerce_surface(payload: Value, symbol: &Symbol) -> Value {
    let mut payload = coerce(payload, symbol, &["underlyingPrice"]);
    if let Some(points) = payload.get_mut("points") {
        fill_rows(points, &["strike", "impliedVol"]);
    }
    payload
}

fn fill_rows(rows: &mut Value, numeric: &[&str]) {
    if let Some(rows) = rows.as_array_mut() {
        for row in rows.iter_mut().filter_map(Value::as_object_mut) {
            for key in numeric {
                fill(row, key, json!(0.0));
            }
        }
    }
}

fn fill(obj: &mut Map<String, Value>, key: &str, default: Value) {
    match obj.get(key) {
        None | Some(Value::Null) => {
            obj.insert(key.to_string(), default);
        }
        Some(_) => {}
    }
}

#[async_trait]
impl Provider for BridgeProvider {
    fn name(&self) -> &str {
        BRIDGE_PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Host application bridge"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Live
    }

    async fn get_prices(&self, symbol: &Symbol, range: PriceRange) -> Result<Vec<PricePoint>> {
        let params = json!({"symbol": symbol.as_str(), "range": range.as_str()});
        let raw = self.call(METHOD_PRICES, symbol, params).await?;
        let points = validate_prices(&coerce_rows(raw))?;
        self.touch(symbol);
        Ok(points)
    }

    async fn get_kpis(&self, symbol: &Symbol) -> Result<KpiSnapshot> {
        let raw = self.call(METHOD_KPIS, symbol, json!({"symbol": symbol.as_str()})).await?;
        let kpis = validate_kpis(&coerce(
            raw,
            symbol,
            &["price", "change", "changePercent", "volume"],
        ))?;
        self.touch(symbol);
        Ok(kpis)
    }

    async fn get_financials(&self, symbol: &Symbol) -> Result<FinancialsSnapshot> {
        let raw = self
            .call(METHOD_FINANCIALS, symbol, json!({"symbol": symbol.as_str()}))
            .await?;
        let financials = validate_financials(&coerce(raw, symbol, &["revenue", "netIncome"]))?;
        self.touch(symbol);
        Ok(financials)
    }

    async fn get_vol_surface(&self, symbol: &Symbol) -> Result<VolSurface> {
        let raw = self.call(METHOD_VOL, symbol, json!({"symbol": symbol.as_str()})).await?;
        let surface = validate_vol_surface(&coerce_surface(raw, symbol))?;
        self.touch(symbol);
        Ok(surface)
    }

    async fn is_available(&self) -> bool {
        self.bridge.is_some()
    }

    async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.bridge.is_some())
    }

    async fn last_update(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        let updated = self.updated.lock().unwrap_or_else(PoisonError::into_inner);
        updated.get(symbol).copied()
    }
}
