#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Synthetic data provider.
//!
//! This crate implements the [`Provider`] trait from `feeds-core` with a
//! generator instead of an upstream source.
//!
//! # Features
//!
//! - Reproducible series: seeds come from a SHA-256 hash of `symbol:kind`
//! - Random walk with drift and normally distributed shocks
//! - High/low always bound open/close
//! - KPIs, financials and a volatility surface consistent with the price path
//!
//! # Example
//!
//! ```no_run
//! use feeds_synthetic::SyntheticProvider;
//! use feeds_core::{PriceRange, Provider, Symbol};
//!
//! # async fn example() -> feeds_core::Result<()> {
//! let provider = SyntheticProvider::new();
//! let points = provider.get_prices(&Symbol::new("AAPL"), PriceRange::OneMonth).await?;
//! println!("Generated {} points", points.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use feeds_core::{
    FeedError, FinancialsSnapshot, KpiSnapshot, PricePoint, PriceRange, Provider, ProviderKind,
    Result, Symbol, Validate, VolPoint, VolSurface,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Name the synthetic provider reports.
pub const SYNTHETIC_PROVIDER_NAME: &str = "mock";

/// Strike grid as a fraction of spot.
const MONEYNESS: [f64; 7] = [0.8, 0.9, 0.95, 1.0, 1.05, 1.1, 1.2];

/// Expiries in calendar days from the as-of date.
const EXPIRY_DAYS: [i64; 5] = [30, 60, 90, 180, 365];

/// Deterministic synthetic data provider.
///
/// Implements [`Provider`]. Never fails for a non-empty symbol.
#[derive(Clone, Debug)]
pub struct SyntheticProvider {
    as_of: NaiveDate,
}

impl SyntheticProvider {
    /// Create a provider whose series end today (UTC).
    #[must_use]
    pub fn new() -> Self {
        Self::with_as_of(Utc::now().date_naive())
    }

    /// Create a provider whose series end on `as_of`.
    #[must_use]
    pub const fn with_as_of(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    /// Last date of every generated series.
    #[must_use]
    pub const fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Generate the price series for `symbol` over `range`.
    ///
    /// One point per calendar day, ending on the as-of date. Every range is
    /// the tail of the same five-year walk, so ranges agree where they overlap.
    #[must_use]
    pub fn generate_prices(&self, symbol: &Symbol, range: PriceRange) -> Vec<PricePoint> {
        let mut points = self.walk(symbol);
        let keep = (range.lookback_days().max(0) as usize).min(points.len());
        points.split_off(points.len() - keep)
    }

    fn walk(&self, symbol: &Symbol) -> Vec<PricePoint> {
        let mut rng = seeded_rng(symbol, "prices");

        let days = PriceRange::FiveYears.lookback_days();
        let start = self.as_of - Duration::days(days - 1);
        let base_price: f64 = rng.gen_range(20.0..500.0);
        let base_volume: f64 = rng.gen_range(200_000.0..20_000_000.0);
        let drift: f64 = rng.gen_range(-0.0005..0.0015);
        let vol: f64 = rng.gen_range(0.008..0.03);

        let mut points = Vec::with_capacity(days as usize);
        let mut price = base_price;

        for i in 0..days {
            let date = start + Duration::days(i);
            let z: f64 = rng.sample(StandardNormal);

            let open = price;
            let close = (open * (1.0 + drift + vol * z)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.6) * vol);
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.6) * vol);
            let volume = (base_volume * rng.gen_range(0.5..1.5)).round();

            // rounding is monotonic, so the clamp survives it
            let open = round_cents(open);
            let close = round_cents(close);
            let high = round_cents(high.max(open).max(close));
            let low = round_cents(low.min(open).min(close).max(0.0));

            points.push(PricePoint::new(
                midnight(date),
                open,
                high,
                low,
                close,
                volume,
            ));
            price = close;
        }

        points
    }

    fn generate_kpis(&self, symbol: &Symbol) -> KpiSnapshot {
        let year = self.generate_prices(symbol, PriceRange::OneYear);
        let mut rng = seeded_rng(symbol, "kpis");

        let last = year.last().map_or(0.0, |p| p.close);
        let prev = year
            .len()
            .checked_sub(2)
            .and_then(|i| year.get(i))
            .map_or(last, |p| p.close);
        let change = round_cents(last - prev);
        let change_percent = if prev > 0.0 {
            ((last - prev) / prev * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        let shares: f64 = rng.gen_range(1.0e8..1.0e10);
        let high = year.iter().map(|p| p.high).fold(f64::MIN, f64::max);
        let low = year.iter().map(|p| p.low).fold(f64::MAX, f64::min);

        KpiSnapshot {
            symbol: symbol.clone(),
            price: last,
            change,
            change_percent,
            volume: year.last().map_or(0.0, |p| p.volume),
            market_cap: Some((last * shares).round()),
            pe_ratio: Some((rng.gen_range(8.0..45.0_f64) * 100.0).round() / 100.0),
            dividend_yield: Some((rng.gen_range(0.0..0.04_f64) * 10_000.0).round() / 10_000.0),
            week_52_high: Some(high),
            week_52_low: Some(low),
            timestamp: Utc::now(),
        }
    }

    fn generate_financials(&self, symbol: &Symbol) -> FinancialsSnapshot {
        let kpis = self.generate_kpis(symbol);
        let mut rng = seeded_rng(symbol, "financials");

        let market_cap = kpis.market_cap.unwrap_or(1.0e9);
        let revenue = (market_cap / rng.gen_range(1.0..10.0)).round();
        let net_income = (revenue * rng.gen_range(0.03..0.3)).round();
        let cash_flow = (net_income * rng.gen_range(0.8..1.4)).round();
        let free_cash_flow = (cash_flow * rng.gen_range(0.5..0.9)).round();

        FinancialsSnapshot {
            symbol: symbol.clone(),
            revenue,
            net_income,
            cash_flow: Some(cash_flow),
            free_cash_flow: Some(free_cash_flow),
            timestamp: Utc::now(),
        }
    }

    fn generate_vol_surface(&self, symbol: &Symbol) -> VolSurface {
        let spot = self
            .generate_prices(symbol, PriceRange::OneMonth)
            .last()
            .map_or(100.0, |p| p.close);
        let mut rng = seeded_rng(symbol, "vol");

        let atm: f64 = rng.gen_range(0.15..0.45);
        let smile: f64 = rng.gen_range(0.5..2.0);
        let skew: f64 = rng.gen_range(0.05..0.3);
        let term: f64 = rng.gen_range(-0.1..0.1);

        let mut points = Vec::with_capacity(MONEYNESS.len() * EXPIRY_DAYS.len());
        for days in EXPIRY_DAYS {
            let t = days as f64 / 365.0;
            for m in MONEYNESS {
                let k = m - 1.0;
                let iv = (atm * (1.0 + smile * k * k) - skew * k) * (1.0 + term * t.sqrt());
                points.push(VolPoint {
                    strike: round_cents(spot * m),
                    expiry: self.as_of + Duration::days(days),
                    implied_vol: (iv.max(0.01) * 10_000.0).round() / 10_000.0,
                });
            }
        }

        VolSurface {
            symbol: symbol.clone(),
            underlying_price: spot,
            points,
            timestamp: Utc::now(),
        }
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for SyntheticProvider {
    fn name(&self) -> &str {
        SYNTHETIC_PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Deterministic synthetic data for demos, tests and fallback"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Synthetic
    }

    async fn get_prices(&self, symbol: &Symbol, range: PriceRange) -> Result<Vec<PricePoint>> {
        require_symbol(symbol)?;
        let points = self.generate_prices(symbol, range);
        points.as_slice().validate()?;
        debug!(symbol = %symbol, range = %range, points = points.len(), "Generated prices");
        Ok(points)
    }

    async fn get_kpis(&self, symbol: &Symbol) -> Result<KpiSnapshot> {
        require_symbol(symbol)?;
        let kpis = self.generate_kpis(symbol);
        kpis.validate()?;
        Ok(kpis)
    }

    async fn get_financials(&self, symbol: &Symbol) -> Result<FinancialsSnapshot> {
        require_symbol(symbol)?;
        let financials = self.generate_financials(symbol);
        financials.validate()?;
        Ok(financials)
    }

    async fn get_vol_surface(&self, symbol: &Symbol) -> Result<VolSurface> {
        require_symbol(symbol)?;
        let surface = self.generate_vol_surface(symbol);
        surface.validate()?;
        Ok(surface)
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn is_authenticated(&self) -> Result<bool> {
        Ok(true)
    }

    async fn last_update(&self, _symbol: &Symbol) -> Option<DateTime<Utc>> {
        let ago = rand::thread_rng().gen_range(0..60_000);
        Some(Utc::now() - Duration::milliseconds(ago))
    }
}

/// Seed a generator from `symbol:suffix`.
fn seeded_rng(symbol: &Symbol, suffix: &str) -> StdRng {
    let digest = Sha256::digest(format!("{}:{suffix}", symbol.as_str()).as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(seed))
}

fn require_symbol(symbol: &Symbol) -> Result<()> {
    if symbol.is_empty() {
        return Err(FeedError::InvalidParameter("symbol is empty".to_string()));
    }
    Ok(())
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SyntheticProvider {
        SyntheticProvider::with_as_of(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap())
    }

    #[tokio::test]
    async fn test_prices_are_deterministic() {
        let provider = provider();
        let symbol = Symbol::new("AAPL");
        for range in PriceRange::ALL {
            let a = provider.get_prices(&symbol, range).await.unwrap();
            let b = provider.get_prices(&symbol, range).await.unwrap();
            assert_eq!(a, b, "range {range}");
        }

        let other = SyntheticProvider::with_as_of(provider.as_of());
        assert_eq!(
            provider.get_prices(&symbol, PriceRange::OneYear).await.unwrap(),
            other.get_prices(&symbol, PriceRange::OneYear).await.unwrap()
        );
    }

    #[test]
    fn test_ranges_share_one_walk() {
        let provider = provider();
        let symbol = Symbol::new("AAPL");
        let month = provider.generate_prices(&symbol, PriceRange::OneMonth);
        let year = provider.generate_prices(&symbol, PriceRange::OneYear);

        assert_eq!(month.len(), 30);
        assert_eq!(year.len(), 365);
        assert_eq!(month.as_slice(), &year[year.len() - 30..]);
        assert_eq!(provider.generate_prices(&symbol, PriceRange::FiveYears).len(), 1825);
    }

    #[tokio::test]
    async fn test_symbols_differ() {
        let provider = provider();
        let a = provider.get_prices(&Symbol::new("AAPL"), PriceRange::OneMonth).await.unwrap();
        let b = provider.get_prices(&Symbol::new("MSFT"), PriceRange::OneMonth).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_series_shape() {
        let provider = provider();
        let points = provider
            .get_prices(&Symbol::new("TSLA"), PriceRange::ThreeMonths)
            .await
            .unwrap();

        assert_eq!(points.len(), 90);
        assert_eq!(points.last().unwrap().date.date_naive(), provider.as_of());
        for pair in points.windows(2) {
            assert!(pair[0].date < pair[1].date);
            assert_eq!(pair[0].close, pair[1].open);
        }
        for p in &points {
            assert!(p.is_ordered(), "{p:?}");
            assert!(p.low >= 0.0);
            assert!(p.volume > 0.0);
        }
    }

    #[tokio::test]
    async fn test_kpis_follow_price_path() {
        let provider = provider();
        let symbol = Symbol::new("NVDA");
        let kpis = provider.get_kpis(&symbol).await.unwrap();
        let year = provider.get_prices(&symbol, PriceRange::OneYear).await.unwrap();

        assert_eq!(kpis.price, year.last().unwrap().close);
        assert!(kpis.week_52_high.unwrap() >= kpis.price);
        assert!(kpis.week_52_low.unwrap() <= kpis.price);
        assert!(kpis.market_cap.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_financials_and_vol() {
        let provider = provider();
        let symbol = Symbol::new("SPY");

        let fin = provider.get_financials(&symbol).await.unwrap();
        assert!(fin.revenue > fin.net_income);
        assert_eq!(fin.revenue, provider.get_financials(&symbol).await.unwrap().revenue);

        let surface = provider.get_vol_surface(&symbol).await.unwrap();
        assert_eq!(surface.points.len(), MONEYNESS.len() * EXPIRY_DAYS.len());
        assert!(surface.points.iter().all(|p| p.implied_vol > 0.0));
    }

    #[tokio::test]
    async fn test_always_available() {
        let provider = provider();
        let symbol = Symbol::new("AAPL");
        assert!(provider.is_available().await);
        assert!(provider.is_authenticated().await.unwrap());
        assert_eq!(provider.kind(), ProviderKind::Synthetic);

        let updated = provider.last_update(&symbol).await.unwrap();
        let age = Utc::now() - updated;
        assert!(age >= Duration::zero());
        assert!(age <= Duration::seconds(61));
    }

    #[tokio::test]
    async fn test_empty_symbol_rejected() {
        let err = provider()
            .get_prices(&Symbol::new(""), PriceRange::OneDay)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidParameter(_)));
    }
}
