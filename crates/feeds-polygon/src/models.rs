//! Mapping from Polygon response bodies onto canonical payloads.
//!
//! The output of each function is an untyped canonical document handed to
//! `feeds_core::validate`, so malformed upstream values fail validation
//! instead of being coerced here.

use chrono::{DateTime, Utc};
use feeds_core::Symbol;
use serde_json::{Map, Value, json};

/// Aggregates body `{"results": [{"t","o","h","l","c","v"}]}` to price rows.
pub(crate) fn aggregates_to_prices(body: &Value) -> Value {
    let rows = body
        .get("results")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    json!({
                        "date": field(row, "t"),
                        "open": field(row, "o"),
                        "high": field(row, "h"),
                        "low": field(row, "l"),
                        "close": field(row, "c"),
                        "volume": field(row, "v"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(rows)
}

/// Snapshot body plus optional company details to a KPI document.
///
/// Returns `None` when the snapshot has no ticker section.
pub(crate) fn snapshot_to_kpis(
    symbol: &Symbol,
    snapshot: &Value,
    company: Option<&Value>,
    now: DateTime<Utc>,
) -> Option<Value> {
    let ticker = snapshot.get("ticker").filter(|t| t.is_object())?;

    // last trade, else today's close, else previous close
    let price = [
        pointer(ticker, "/lastTrade/p"),
        pointer(ticker, "/day/c"),
        pointer(ticker, "/prevDay/c"),
    ]
    .into_iter()
    .find(|v| v.as_f64().is_some_and(|p| p > 0.0))
    .unwrap_or(Value::Null);

    let volume = match pointer(ticker, "/day/v") {
        Value::Null => pointer(ticker, "/prevDay/v"),
        v => v,
    };

    let details = company.and_then(|c| c.get("results"));
    let market_cap = details.map_or(Value::Null, |d| field(d, "market_cap"));

    let mut doc = Map::new();
    doc.insert("symbol".into(), json!(symbol.as_str()));
    doc.insert("price".into(), price);
    doc.insert("change".into(), field(ticker, "todaysChange"));
    doc.insert("changePercent".into(), field(ticker, "todaysChangePerc"));
    doc.insert("volume".into(), volume);
    doc.insert("marketCap".into(), market_cap);
    doc.insert("timestamp".into(), json!(now.to_rfc3339()));
    Some(Value::Object(doc))
}

/// Financials body to a financials document, or `None` when empty.
///
/// Free cash flow is approximated as operating plus investing cash flow.
pub(crate) fn financials_to_snapshot(
    symbol: &Symbol,
    body: &Value,
    now: DateTime<Utc>,
) -> Option<Value> {
    let latest = body.get("results")?.as_array()?.first()?;
    let statements = latest.get("financials")?;

    let income = |key: &str| pointer(statements, &format!("/income_statement/{key}/value"));
    let cash = |key: &str| pointer(statements, &format!("/cash_flow_statement/{key}/value"));

    let free_cash_flow = match (
        cash("net_cash_flow_from_operating_activities").as_f64(),
        cash("net_cash_flow_from_investing_activities").as_f64(),
    ) {
        (Some(operating), Some(investing)) => json!(operating + investing),
        _ => Value::Null,
    };

    Some(json!({
        "symbol": symbol.as_str(),
        "revenue": income("revenues"),
        "netIncome": income("net_income_loss"),
        "cashFlow": cash("net_cash_flow"),
        "freeCashFlow": free_cash_flow,
        "timestamp": now.to_rfc3339(),
    }))
}

fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

fn pointer(value: &Value, path: &str) -> Value {
    value.pointer(path).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeds_core::validate::{validate_financials, validate_kpis, validate_prices};

    #[test]
    fn test_aggregates_map_to_valid_prices() {
        let body = json!({
            "status": "OK",
            "results": [
                {"t": 1_704_153_600_000_i64, "o": 187.15, "h": 188.44, "l": 183.89, "c": 185.64, "v": 82_488_700.0},
                {"t": 1_704_240_000_000_i64, "o": 184.22, "h": 185.88, "l": 183.43, "c": 184.25, "v": 58_414_460.0}
            ]
        });
        let points = validate_prices(&aggregates_to_prices(&body)).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 185.64);
        assert_eq!(points[1].date.timestamp_millis(), 1_704_240_000_000);
    }

    #[test]
    fn test_aggregates_missing_field_fails_validation() {
        let body = json!({
            "results": [{"t": 1_704_153_600_000_i64, "o": 1.0, "h": 1.0, "l": 1.0, "v": 10.0}]
        });
        assert!(validate_prices(&aggregates_to_prices(&body)).is_err());
    }

    #[test]
    fn test_aggregates_without_results_are_empty() {
        let body = json!({"status": "OK", "resultsCount": 0});
        assert_eq!(aggregates_to_prices(&body), json!([]));
    }

    #[test]
    fn test_snapshot_prefers_last_trade() {
        let symbol = Symbol::new("AAPL");
        let snapshot = json!({
            "ticker": {
                "todaysChange": 1.25,
                "todaysChangePerc": 0.67,
                "day": {"c": 187.0, "v": 1000.0},
                "lastTrade": {"p": 187.4},
                "prevDay": {"c": 186.15, "v": 900.0}
            }
        });
        let company = json!({"results": {"market_cap": 2.9e12}});

        let doc = snapshot_to_kpis(&symbol, &snapshot, Some(&company), Utc::now()).unwrap();
        let kpis = validate_kpis(&doc).unwrap();
        assert_eq!(kpis.price, 187.4);
        assert_eq!(kpis.volume, 1000.0);
        assert_eq!(kpis.market_cap, Some(2.9e12));
        assert_eq!(kpis.pe_ratio, None);
    }

    #[test]
    fn test_snapshot_without_company_degrades() {
        let symbol = Symbol::new("AAPL");
        let snapshot = json!({
            "ticker": {
                "todaysChange": 0.0,
                "todaysChangePerc": 0.0,
                "day": {"c": 0.0},
                "prevDay": {"c": 186.15, "v": 900.0}
            }
        });

        let raw = snapshot_to_kpis(&symbol, &snapshot, None, Utc::now()).unwrap();
        let kpis = validate_kpis(&raw).unwrap();
        assert_eq!(kpis.price, 186.15);
        assert_eq!(kpis.volume, 900.0);
        assert_eq!(kpis.market_cap, None);
    }

    #[test]
    fn test_snapshot_without_ticker() {
        let snapshot = json!({"status": "OK"});
        assert!(snapshot_to_kpis(&Symbol::new("AAPL"), &snapshot, None, Utc::now()).is_none());
    }

    #[test]
    fn test_financials_mapping() {
        let body = json!({
            "results": [{
                "financials": {
                    "income_statement": {
                        "revenues": {"value": 383_285_000_000.0},
                        "net_income_loss": {"value": 96_995_000_000.0}
                    },
                    "cash_flow_statement": {
                        "net_cash_flow": {"value": -3_137_000_000.0},
                        "net_cash_flow_from_operating_activities": {"value": 110_543_000_000.0},
                        "net_cash_flow_from_investing_activities": {"value": 3_705_000_000.0}
                    }
                }
            }]
        });
        let doc = financials_to_snapshot(&Symbol::new("AAPL"), &body, Utc::now()).unwrap();
        let fin = validate_financials(&doc).unwrap();
        assert_eq!(fin.revenue, 383_285_000_000.0);
        assert_eq!(fin.cash_flow, Some(-3_137_000_000.0));
        assert_eq!(fin.free_cash_flow, Some(114_248_000_000.0));
    }

    #[test]
    fn test_financials_empty_results() {
        let body = json!({"results": []});
        assert!(financials_to_snapshot(&Symbol::new("AAPL"), &body, Utc::now()).is_none());
    }
}
