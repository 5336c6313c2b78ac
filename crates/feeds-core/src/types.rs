//! Canonical data types for market data.
//!
//! This module defines the values every adapter hands back to callers:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`PricePoint`] - OHLCV price point
//! - [`KpiSnapshot`] - Point-in-time quote and valuation metrics
//! - [`FinancialsSnapshot`] - Fundamental metrics
//! - [`VolSurface`] - Implied volatility surface
//! - [`Trade`], [`Quote`], [`Aggregate`] - Streaming events

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One OHLCV point of a price series.
///
/// Well-formed series satisfy `high >= max(open, close)` and
/// `low <= min(open, close)`. Generated series guarantee it; series from
/// external sources are passed through as delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Start of the period covered by this point.
    pub date: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
}

impl PricePoint {
    /// Creates a new price point.
    #[must_use]
    pub const fn new(
        date: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if high and low bound both open and close.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

/// Point-in-time quote and valuation metrics for a symbol.
///
/// Recomputed on every call; never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    /// Stock symbol.
    pub symbol: Symbol,
    /// Last price.
    pub price: f64,
    /// Absolute change versus the previous close.
    pub change: f64,
    /// Percentage change versus the previous close.
    pub change_percent: f64,
    /// Session volume.
    pub volume: f64,
    /// Market capitalization.
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Price-to-earnings ratio.
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    /// Dividend yield.
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    /// 52-week high price.
    #[serde(default)]
    pub week_52_high: Option<f64>,
    /// 52-week low price.
    #[serde(default)]
    pub week_52_low: Option<f64>,
    /// Time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Fundamental metrics for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialsSnapshot {
    /// Stock symbol.
    pub symbol: Symbol,
    /// Total revenue.
    pub revenue: f64,
    /// Net income.
    pub net_income: f64,
    /// Net cash flow.
    #[serde(default)]
    pub cash_flow: Option<f64>,
    /// Free cash flow.
    #[serde(default)]
    pub free_cash_flow: Option<f64>,
    /// Time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// One implied volatility observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolPoint {
    /// Option strike.
    pub strike: f64,
    /// Option expiry date.
    pub expiry: NaiveDate,
    /// Implied volatility as a decimal (0.25 = 25%).
    pub implied_vol: f64,
}

/// Implied volatility surface for an underlying.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolSurface {
    /// Underlying symbol.
    pub symbol: Symbol,
    /// Spot price of the underlying.
    pub underlying_price: f64,
    /// Surface points.
    pub points: Vec<VolPoint>,
    /// Time the surface was built.
    pub timestamp: DateTime<Utc>,
}

/// A trade print received from a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Symbol traded.
    pub symbol: Symbol,
    /// Trade price.
    pub price: f64,
    /// Trade size.
    pub size: f64,
    /// Exchange identifier.
    pub exchange: Option<i64>,
    /// Trade condition codes.
    pub conditions: Vec<i64>,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

/// A top-of-book quote received from a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: Symbol,
    /// Best bid price.
    pub bid_price: f64,
    /// Best bid size.
    pub bid_size: f64,
    /// Best ask price.
    pub ask_price: f64,
    /// Best ask size.
    pub ask_size: f64,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.bid_price + self.ask_price) / 2.0
    }
}

/// An aggregate bar received from a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Aggregated symbol.
    pub symbol: Symbol,
    /// Opening price of the window.
    pub open: f64,
    /// Highest price of the window.
    pub high: f64,
    /// Lowest price of the window.
    pub low: f64,
    /// Closing price of the window.
    pub close: f64,
    /// Volume traded in the window.
    pub volume: f64,
    /// Volume-weighted average price, when reported.
    pub vwap: Option<f64>,
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}
