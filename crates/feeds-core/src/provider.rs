//! The provider contract shared by every adapter.
//!
//! A [`Provider`] normalizes one external data source behind a uniform async
//! interface. Every value it returns has passed through
//! [`validate`](crate::validate) before reaching the caller, and every failure
//! is surfaced as a [`FeedError`](crate::FeedError) for the whole call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{
    error::{FeedError, Result},
    range::PriceRange,
    types::{FinancialsSnapshot, KpiSnapshot, PricePoint, Symbol, VolSurface},
};

/// What kind of source a provider fronts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Generated data; always available, excluded from health aggregation.
    Synthetic,
    /// A real upstream source.
    Live,
}

/// Uniform interface over one market data source.
///
/// # Example
///
/// ```rust,ignore
/// use feeds_core::{PriceRange, Provider, Symbol};
///
/// async fn latest_close(provider: &dyn Provider) -> feeds_core::Result<f64> {
///     let points = provider.get_prices(&Symbol::new("AAPL"), PriceRange::OneMonth).await?;
///     Ok(points.last().map(|p| p.close).unwrap_or_default())
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "polygon").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Returns whether the provider serves generated or live data.
    fn kind(&self) -> ProviderKind;

    /// Returns true if the provider offers streaming subscriptions.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Fetches a price series for `symbol` over `range`, oldest first.
    async fn get_prices(&self, symbol: &Symbol, range: PriceRange) -> Result<Vec<PricePoint>>;

    /// Fetches a point-in-time KPI snapshot.
    async fn get_kpis(&self, symbol: &Symbol) -> Result<KpiSnapshot>;

    /// Fetches a fundamentals snapshot.
    async fn get_financials(&self, symbol: &Symbol) -> Result<FinancialsSnapshot>;

    /// Fetches an implied volatility surface.
    async fn get_vol_surface(&self, symbol: &Symbol) -> Result<VolSurface> {
        Err(FeedError::NotSupported(format!(
            "{} does not provide volatility surfaces (requested {symbol})",
            self.name()
        )))
    }

    /// Returns true if the provider can be used in this environment.
    async fn is_available(&self) -> bool;

    /// Checks whether the configured credential is accepted upstream.
    async fn is_authenticated(&self) -> Result<bool>;

    /// Returns when data for `symbol` was last refreshed, if known.
    async fn last_update(&self, symbol: &Symbol) -> Option<DateTime<Utc>>;
}
