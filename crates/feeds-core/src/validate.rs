//! Payload validation at the trust boundary.
//!
//! External payloads (HTTP bodies, bridge responses) arrive as untyped
//! [`serde_json::Value`]s. The functions here check shape and primitive types
//! and either return a canonical value or fail the whole payload:
//!
//! - numbers must be JSON numbers; strings are never coerced
//! - required fields must be present and non-null
//! - dates must parse (`YYYY-MM-DD`, RFC 3339, or epoch milliseconds)
//! - prices, volumes and vols must be finite and non-negative
//!
//! Rows are never dropped. Relative OHLC ordering is reported as a warning
//! only; it is enforced by generators, not at this boundary.
//!
//! Values built in-process go through the same range rules via [`Validate`].

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{FeedError, Result};
use crate::types::{FinancialsSnapshot, KpiSnapshot, PricePoint, Symbol, VolPoint, VolSurface};

/// Kind of payload being validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// A price series (array of OHLCV points).
    Prices,
    /// A KPI snapshot.
    Kpis,
    /// A financials snapshot.
    Financials,
    /// A volatility surface.
    VolSurface,
}

/// A validated canonical value.
#[derive(Clone, Debug, PartialEq)]
pub enum Canonical {
    /// Validated price series.
    Prices(Vec<PricePoint>),
    /// Validated KPI snapshot.
    Kpis(KpiSnapshot),
    /// Validated financials snapshot.
    Financials(FinancialsSnapshot),
    /// Validated volatility surface.
    VolSurface(VolSurface),
}

/// Validates `payload` as the given kind.
pub fn validate(kind: PayloadKind, payload: &Value) -> Result<Canonical> {
    match kind {
        PayloadKind::Prices => validate_prices(payload).map(Canonical::Prices),
        PayloadKind::Kpis => validate_kpis(payload).map(Canonical::Kpis),
        PayloadKind::Financials => validate_financials(payload).map(Canonical::Financials),
        PayloadKind::VolSurface => validate_vol_surface(payload).map(Canonical::VolSurface),
    }
}

/// Validates an array of price points.
pub fn validate_prices(payload: &Value) -> Result<Vec<PricePoint>> {
    let rows = payload
        .as_array()
        .ok_or_else(|| {
            FeedError::validation(format!("prices: expected array, got {}", kind_of(payload)))
        })?;

    let mut points = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let fields = Fields::new(row, format!("prices[{i}]"))?;
        let point = PricePoint {
            date: fields.datetime("date")?,
            open: fields.number("open")?,
            high: fields.number("high")?,
            low: fields.number("low")?,
            close: fields.number("close")?,
            volume: fields.number("volume")?,
        };
        point
            .validate()
            .map_err(|e| FeedError::validation(format!("prices[{i}]: {}", strip(&e))))?;
        points.push(point);
    }

    let unordered = points.iter().filter(|p| !p.is_ordered()).count();
    if unordered > 0 {
        warn!(
            unordered,
            total = points.len(),
            "Price series has points where high/low do not bound open/close"
        );
    }

    Ok(points)
}

/// Validates a KPI snapshot object.
pub fn validate_kpis(payload: &Value) -> Result<KpiSnapshot> {
    let fields = Fields::new(payload, "kpis".to_string())?;
    let snapshot = KpiSnapshot {
        symbol: fields.symbol("symbol")?,
        price: fields.number("price")?,
        change: fields.number("change")?,
        change_percent: fields.number("changePercent")?,
        volume: fields.number("volume")?,
        market_cap: fields.opt_number("marketCap")?,
        pe_ratio: fields.opt_number("peRatio")?,
        dividend_yield: fields.opt_number("dividendYield")?,
        week_52_high: fields.opt_number("week52High")?,
        week_52_low: fields.opt_number("week52Low")?,
        timestamp: fields.datetime("timestamp")?,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

/// Validates a financials snapshot object.
pub fn validate_financials(payload: &Value) -> Result<FinancialsSnapshot> {
    let fields = Fields::new(payload, "financials".to_string())?;
    let snapshot = FinancialsSnapshot {
        symbol: fields.symbol("symbol")?,
        revenue: fields.number("revenue")?,
        net_income: fields.number("netIncome")?,
        cash_flow: fields.opt_number("cashFlow")?,
        free_cash_flow: fields.opt_number("freeCashFlow")?,
        timestamp: fields.datetime("timestamp")?,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

/// Validates a volatility surface object.
pub fn validate_vol_surface(payload: &Value) -> Result<VolSurface> {
    let fields = Fields::new(payload, "vol".to_string())?;
    let raw_points = fields.array("points")?;

    let mut points = Vec::with_capacity(raw_points.len());
    for (i, raw) in raw_points.iter().enumerate() {
        let point = Fields::new(raw, format!("vol.points[{i}]"))?;
        points.push(VolPoint {
            strike: point.number("strike")?,
            expiry: point.date("expiry")?,
            implied_vol: point.number("impliedVol")?,
        });
    }

    let surface = VolSurface {
        symbol: fields.symbol("symbol")?,
        underlying_price: fields.number("underlyingPrice")?,
        points,
        timestamp: fields.datetime("timestamp")?,
    };
    surface.validate()?;
    Ok(surface)
}

/// Range checks for values built in-process.
pub trait Validate {
    /// Returns an error describing the first rule the value breaks.
    fn validate(&self) -> Result<()>;
}

impl Validate for PricePoint {
    fn validate(&self) -> Result<()> {
        non_negative("open", self.open)?;
        non_negative("high", self.high)?;
        non_negative("low", self.low)?;
        non_negative("close", self.close)?;
        non_negative("volume", self.volume)
    }
}

impl Validate for [PricePoint] {
    fn validate(&self) -> Result<()> {
        for (i, point) in self.iter().enumerate() {
            point
                .validate()
                .map_err(|e| FeedError::validation(format!("prices[{i}]: {}", strip(&e))))?;
        }
        Ok(())
    }
}

impl Validate for KpiSnapshot {
    fn validate(&self) -> Result<()> {
        require_symbol(&self.symbol)?;
        non_negative("price", self.price)?;
        finite("change", self.change)?;
        finite("changePercent", self.change_percent)?;
        non_negative("volume", self.volume)?;
        opt_non_negative("marketCap", self.market_cap)?;
        opt_finite("peRatio", self.pe_ratio)?;
        opt_non_negative("dividendYield", self.dividend_yield)?;
        opt_non_negative("week52High", self.week_52_high)?;
        opt_non_negative("week52Low", self.week_52_low)?;
        if let (Some(high), Some(low)) = (self.week_52_high, self.week_52_low) {
            if high < low {
                return Err(FeedError::validation(format!(
                    "week52High {high} is below week52Low {low}"
                )));
            }
        }
        Ok(())
    }
}

impl Validate for FinancialsSnapshot {
    fn validate(&self) -> Result<()> {
        require_symbol(&self.symbol)?;
        finite("revenue", self.revenue)?;
        finite("netIncome", self.net_income)?;
        opt_finite("cashFlow", self.cash_flow)?;
        opt_finite("freeCashFlow", self.free_cash_flow)
    }
}

impl Validate for VolSurface {
    fn validate(&self) -> Result<()> {
        require_symbol(&self.symbol)?;
        non_negative("underlyingPrice", self.underlying_price)?;
        for (i, point) in self.points.iter().enumerate() {
            non_negative("strike", point.strike)
                .and_then(|()| non_negative("impliedVol", point.implied_vol))
                .map_err(|e| FeedError::validation(format!("points[{i}]: {}", strip(&e))))?;
        }
        Ok(())
    }
}

/// Typed accessor over one JSON object, carrying a context path for errors.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    ctx: String,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value, ctx: String) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            FeedError::validation(format!("{ctx}: expected object, got {}", kind_of(value)))
        })?;
        Ok(Self { obj, ctx })
    }

    fn required(&self, name: &str) -> Result<&'a Value> {
        match self.obj.get(name) {
            None | Some(Value::Null) => Err(FeedError::validation(format!(
                "{}: missing required field '{name}'",
                self.ctx
            ))),
            Some(v) => Ok(v),
        }
    }

    fn number(&self, name: &str) -> Result<f64> {
        let value = self.required(name)?;
        value.as_f64().ok_or_else(|| self.type_error(name, "number", value))
    }

    fn opt_number(&self, name: &str) -> Result<Option<f64>> {
        match self.obj.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.type_error(name, "number", value)),
        }
    }

    fn array(&self, name: &str) -> Result<&'a Vec<Value>> {
        let value = self.required(name)?;
        value.as_array().ok_or_else(|| self.type_error(name, "array", value))
    }

    fn symbol(&self, name: &str) -> Result<Symbol> {
        let value = self.required(name)?;
        let s = value.as_str().ok_or_else(|| self.type_error(name, "string", value))?;
        let symbol = Symbol::new(s);
        if symbol.is_empty() {
            return Err(FeedError::validation(format!("{}: '{name}' is empty", self.ctx)));
        }
        Ok(symbol)
    }

    fn datetime(&self, name: &str) -> Result<DateTime<Utc>> {
        let value = self.required(name)?;
        parse_datetime(value).ok_or_else(|| self.type_error(name, "date", value))
    }

    fn date(&self, name: &str) -> Result<NaiveDate> {
        let value = self.required(name)?;
        parse_datetime(value)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| self.type_error(name, "date", value))
    }

    fn type_error(&self, name: &str, expected: &str, got: &Value) -> FeedError {
        FeedError::validation(format!(
            "{}: field '{name}' expected {expected}, got {}",
            self.ctx,
            kind_of(got)
        ))
    }
}

/// Parses an RFC 3339 string, a `YYYY-MM-DD` string, or epoch milliseconds.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip(err: &FeedError) -> String {
    match err {
        FeedError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn require_symbol(symbol: &Symbol) -> Result<()> {
    if symbol.is_empty() {
        return Err(FeedError::validation("symbol is empty"));
    }
    Ok(())
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FeedError::validation(format!("{name} is not finite: {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    finite(name, value)?;
    if value < 0.0 {
        return Err(FeedError::validation(format!("{name} is negative: {value}")));
    }
    Ok(())
}

fn opt_finite(name: &str, value: Option<f64>) -> Result<()> {
    value.map_or(Ok(()), |v| finite(name, v))
}

fn opt_non_negative(name: &str, value: Option<f64>) -> Result<()> {
    value.map_or(Ok(()), |v| non_negative(name, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series() -> Value {
        json!([
            {"date": "2024-03-01", "open": 10.0, "high": 11.0, "low": 9.5, "close": 10.5, "volume": 1000},
            {"date": "2024-03-04T00:00:00Z", "open": 10.5, "high": 10.9, "low": 10.1, "close": 10.2, "volume": 800},
            {"date": 1709683200000i64, "open": 10.2, "high": 10.4, "low": 9.9, "close": 10.0, "volume": 0}
        ])
    }

    #[test]
    fn test_valid_series_accepted() {
        let points = validate_prices(&series()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(points[2].date.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        assert_eq!(points[1].close, 10.2);
    }

    #[test]
    fn test_missing_numeric_field_rejected() {
        let mut payload = series();
        payload[1].as_object_mut().unwrap().remove("close");

        let err = validate(PayloadKind::Prices, &payload).unwrap_err();
        match err {
            FeedError::Validation(msg) => {
                assert!(msg.contains("prices[1]"), "{msg}");
                assert!(msg.contains("close"), "{msg}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_string_numbers_not_coerced() {
        let payload = json!([
            {"date": "2024-03-01", "open": "10.0", "high": 11.0, "low": 9.5, "close": 10.5, "volume": 1}
        ]);
        assert!(matches!(validate_prices(&payload), Err(FeedError::Validation(_))));
    }

    #[test]
    fn test_unparseable_date_rejected() {
        let payload = json!([
            {"date": "March 1st", "open": 10.0, "high": 11.0, "low": 9.5, "close": 10.5, "volume": 1}
        ]);
        assert!(matches!(validate_prices(&payload), Err(FeedError::Validation(_))));
    }

    #[test]
    fn test_negative_volume_rejected() {
        let payload = json!([
            {"date": "2024-03-01", "open": 10.0, "high": 11.0, "low": 9.5, "close": 10.5, "volume": -5}
        ]);
        assert!(validate_prices(&payload).is_err());
    }

    #[test]
    fn test_unordered_ohlc_is_accepted() {
        let payload = json!([
            {"date": "2024-03-01", "open": 10.0, "high": 9.0, "low": 9.5, "close": 10.5, "volume": 1}
        ]);
        let points = validate_prices(&payload).unwrap();
        assert!(!points[0].is_ordered());
    }

    #[test]
    fn test_non_array_prices_rejected() {
        assert!(validate_prices(&json!({"results": []})).is_err());
    }

    #[test]
    fn test_kpis() {
        let payload = json!({
            "symbol": "aapl",
            "price": 190.1,
            "change": -1.2,
            "changePercent": -0.63,
            "volume": 5_000_000,
            "marketCap": 2.9e12,
            "peRatio": null,
            "timestamp": "2024-03-01T15:30:00Z"
        });
        let kpis = validate_kpis(&payload).unwrap();
        assert_eq!(kpis.symbol.as_str(), "AAPL");
        assert_eq!(kpis.market_cap, Some(2.9e12));
        assert_eq!(kpis.pe_ratio, None);

        let mut missing = payload.clone();
        missing.as_object_mut().unwrap().remove("volume");
        assert!(validate_kpis(&missing).is_err());
    }

    #[test]
    fn test_kpis_inverted_52_week_range_rejected() {
        let payload = json!({
            "symbol": "AAPL", "price": 1.0, "change": 0.0, "changePercent": 0.0, "volume": 1,
            "week52High": 10.0, "week52Low": 20.0, "timestamp": "2024-03-01"
        });
        assert!(validate_kpis(&payload).is_err());
    }

    #[test]
    fn test_financials() {
        let payload = json!({
            "symbol": "MSFT",
            "revenue": 2.1e11,
            "netIncome": 7.2e10,
            "cashFlow": -1.0e9,
            "timestamp": "2024-03-01"
        });
        let fin = validate_financials(&payload).unwrap();
        assert_eq!(fin.cash_flow, Some(-1.0e9));
        assert_eq!(fin.free_cash_flow, None);
    }

    #[test]
    fn test_vol_surface() {
        let payload = json!({
            "symbol": "SPY",
            "underlyingPrice": 510.0,
            "points": [
                {"strike": 500.0, "expiry": "2024-06-21", "impliedVol": 0.18},
                {"strike": 520.0, "expiry": "2024-06-21", "impliedVol": 0.16}
            ],
            "timestamp": "2024-03-01T00:00:00Z"
        });
        let Canonical::VolSurface(surface) = validate(PayloadKind::VolSurface, &payload).unwrap()
        else {
            panic!("expected vol surface");
        };
        assert_eq!(surface.points.len(), 2);

        let mut bad = payload.clone();
        bad["points"][1]["impliedVol"] = json!(-0.1);
        let err = validate_vol_surface(&bad).unwrap_err();
        assert!(err.to_string().contains("points[1]"));
    }

    #[test]
    fn test_typed_validation_rejects_nan() {
        let point = PricePoint::new(Utc::now(), f64::NAN, 1.0, 1.0, 1.0, 1.0);
        assert!(point.validate().is_err());
        assert!(vec![point].as_slice().validate().is_err());
    }
}
