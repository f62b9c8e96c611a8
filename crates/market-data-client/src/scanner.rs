//! Bulk scanner client: many venue-qualified symbols per POST, plus the
//! single-symbol technical rating lookup served by the same endpoint.

use async_trait::async_trait;
use reqwest::Client;
use screener_core::{
    BulkScanner, FundamentalSnapshot, QualifiedSymbol, RawYield, RecommendationProvider,
    ScanRecord, ScreenerConfig, ScreenerError, SignalClassification, TechnicalRecommendation,
    YieldConvention,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::{build_client, ensure_success, request_error, RateLimiter};

const DEFAULT_SCAN_URL: &str = "https://scanner.tradingview.com/america/scan";

/// Columns requested for every bulk scan, in response order.
pub const SCAN_COLUMNS: [&str; 9] = [
    "name",
    "close",
    "market_cap_basic",
    "dividend_yield_recent",
    "Recommend.All",
    "beta_1_year",
    "description",
    "sector",
    "dividend_ex_date_recent",
];

const RATING_COLUMNS: [&str; 3] = ["Recommend.All", "Recommend.MA", "Recommend.Other"];

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Option<Vec<ScanRow>>,
}

#[derive(Debug, Deserialize)]
struct ScanRow {
    s: String,
    #[serde(default)]
    d: Vec<Value>,
}

#[derive(Clone)]
pub struct ScannerClient {
    client: Client,
    scan_url: String,
    yield_convention: YieldConvention,
    interval_suffix: String,
    rate_limiter: RateLimiter,
}

impl ScannerClient {
    pub fn new(timeout: Duration, yield_convention: YieldConvention) -> Self {
        Self {
            client: build_client(timeout),
            scan_url: DEFAULT_SCAN_URL.to_string(),
            yield_convention,
            interval_suffix: String::new(),
            rate_limiter: RateLimiter::per_minute_from_env("SCANNER_RATE_LIMIT", 300),
        }
    }

    /// Fails when `signal_interval` names a timeframe the scanner has no
    /// rating columns for.
    pub fn from_config(config: &ScreenerConfig) -> Result<Self, ScreenerError> {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            config.scanner_yield_convention,
        )
        .with_interval(&config.signal_interval)
    }

    pub fn with_scan_url(mut self, url: impl Into<String>) -> Self {
        self.scan_url = url.into();
        self
    }

    /// Rating timeframe for recommendation lookups (`1d` when unset).
    pub fn with_interval(mut self, interval: &str) -> Result<Self, ScreenerError> {
        self.interval_suffix = interval_suffix(interval)?;
        Ok(self)
    }

    async fn post_scan(&self, tickers: &[String], columns: &[String]) -> Result<Vec<ScanRow>, ScreenerError> {
        let body = json!({
            "symbols": { "tickers": tickers, "query": { "types": [] } },
            "columns": columns,
        });

        self.rate_limiter.acquire().await;
        let response = self
            .client
            .post(&self.scan_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("scan", e))?;
        let response = ensure_success(response).await?;

        let parsed: ScanResponse = response
            .json()
            .await
            .map_err(|e| ScreenerError::ParseError(format!("scan response: {}", e)))?;

        Ok(parsed.data.unwrap_or_default())
    }
}

#[async_trait]
impl BulkScanner for ScannerClient {
    async fn scan(&self, symbols: &[QualifiedSymbol]) -> Result<Vec<ScanRecord>, ScreenerError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let lookup: HashMap<String, &QualifiedSymbol> =
            symbols.iter().map(|s| (s.qualified(), s)).collect();
        let tickers: Vec<String> = symbols.iter().map(|s| s.qualified()).collect();
        let columns: Vec<String> = SCAN_COLUMNS.iter().map(|c| c.to_string()).collect();

        let rows = self.post_scan(&tickers, &columns).await?;
        let total = rows.len();

        let records: Vec<ScanRecord> = rows
            .iter()
            .filter_map(|row| {
                let Some(symbol) = lookup.get(&row.s) else {
                    tracing::debug!("Scanner returned unrequested symbol {}", row.s);
                    return None;
                };
                parse_scan_row(row, (*symbol).clone(), self.yield_convention)
            })
            .collect();

        tracing::debug!(
            "Scanner chunk: {} requested, {} rows, {} with data",
            symbols.len(),
            total,
            records.len()
        );
        Ok(records)
    }
}

#[async_trait]
impl RecommendationProvider for ScannerClient {
    async fn recommendation(
        &self,
        symbol: &QualifiedSymbol,
    ) -> Result<Option<TechnicalRecommendation>, ScreenerError> {
        let columns: Vec<String> = RATING_COLUMNS
            .iter()
            .map(|c| format!("{}{}", c, self.interval_suffix))
            .collect();
        let rows = self.post_scan(&[symbol.qualified()], &columns).await?;

        let Some(row) = rows.iter().find(|r| r.s == symbol.qualified()) else {
            return Ok(None);
        };
        let Some(score) = number(row.d.first()) else {
            return Ok(None);
        };

        Ok(Some(TechnicalRecommendation {
            score,
            label: SignalClassification::from_score(score),
            moving_averages: number(row.d.get(1)),
            oscillators: number(row.d.get(2)),
        }))
    }
}

/// Build a record from one row. Rows without a close are not data-bearing.
fn parse_scan_row(row: &ScanRow, symbol: QualifiedSymbol, convention: YieldConvention) -> Option<ScanRecord> {
    let field = |name: &str| {
        SCAN_COLUMNS
            .iter()
            .position(|c| *c == name)
            .and_then(|i| row.d.get(i))
    };

    let price = number(field("close"))?;

    let snapshot = FundamentalSnapshot {
        name: text(field("description")).or_else(|| text(field("name"))),
        sector: text(field("sector")),
        price: Some(price),
        market_cap: number(field("market_cap_basic")),
        beta: number(field("beta_1_year")),
        dividend_yield: number(field("dividend_yield_recent")).map(|v| RawYield::new(v, convention)),
        dividend_rate: None,
        ex_dividend_ts: number(field("dividend_ex_date_recent")).map(|v| v as i64),
    };

    Some(ScanRecord {
        symbol,
        snapshot,
        recommendation: number(field("Recommend.All")),
    })
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Column suffix selecting a rating timeframe. Daily ratings carry none.
pub fn interval_suffix(interval: &str) -> Result<String, ScreenerError> {
    let suffix = match interval {
        "1m" => "|1",
        "5m" => "|5",
        "15m" => "|15",
        "30m" => "|30",
        "1h" => "|60",
        "2h" => "|120",
        "4h" => "|240",
        "1d" => "",
        "1W" => "|1W",
        "1M" => "|1M",
        other => {
            return Err(ScreenerError::ConfigError(format!(
                "unsupported rating interval '{}'",
                other
            )))
        }
    };
    Ok(suffix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use screener_core::{QualificationPlan, TickerSymbol, Venue};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ScannerClient {
        ScannerClient::new(Duration::from_secs(5), YieldConvention::Percent)
            .with_scan_url(format!("{}/america/scan", server.uri()))
    }

    fn candidates(raw: &[&str]) -> Vec<QualifiedSymbol> {
        let symbols: Vec<TickerSymbol> = raw.iter().filter_map(|s| TickerSymbol::parse(s)).collect();
        QualificationPlan::default().candidates(&symbols)
    }

    #[tokio::test]
    async fn test_scan_maps_rows_back_to_requested_forms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/america/scan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalCount": 3,
                "data": [
                    { "s": "NYSE:KO", "d": ["KO", 60.5, 2.6e11, 3.1, 0.32, 0.58, "Coca-Cola Company (The)", "Consumer Non-Durables", 1700000000] },
                    { "s": "NYSE:BRK.B", "d": ["BRK.B", null, 8.0e11, null, 0.1, 0.9, "Berkshire Hathaway", "Finance", null] },
                    { "s": "NYSE:ZZZ", "d": ["ZZZ", 1.0, 1.0, 0.0, 0.0, 1.0, "Nobody", "None", null] }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let records = client.scan(&candidates(&["KO", "BRK.B"])).await.unwrap();

        assert_eq!(records.len(), 1);
        let ko = &records[0];
        assert_eq!(ko.symbol.base.as_str(), "KO");
        assert_eq!(ko.symbol.venue, Venue::Nyse);
        assert_eq!(ko.symbol.priority, 1);
        assert_eq!(ko.snapshot.name.as_deref(), Some("Coca-Cola Company (The)"));
        assert_eq!(ko.snapshot.price, Some(60.5));
        assert_eq!(ko.snapshot.beta, Some(0.58));
        assert_eq!(ko.snapshot.ex_dividend_ts, Some(1_700_000_000));
        assert_eq!(ko.recommendation, Some(0.32));
        let yield_pct = ko.snapshot.dividend_yield.unwrap().as_percent();
        assert!((yield_pct - 3.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_scan_http_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).scan(&candidates(&["KO"])).await.unwrap_err();
        assert!(matches!(err, ScreenerError::ApiError(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_scan_null_data_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalCount": 0, "data": null })))
            .mount(&server)
            .await;

        let records = client_for(&server).scan(&candidates(&["KO"])).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "s": "NASDAQ:AAPL", "d": [0.62, 0.8, 0.1] }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let form = &candidates(&["AAPL"])[0];
        let rec = client.recommendation(form).await.unwrap().unwrap();
        assert_eq!(rec.label, SignalClassification::StrongBuy);
        assert_eq!(rec.moving_averages, Some(0.8));
        assert_eq!(rec.oscillators, Some(0.1));

        let nyse_form = &candidates(&["AAPL"])[1];
        assert!(client.recommendation(nyse_form).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_configured_interval_selects_rating_columns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "s": "NASDAQ:AAPL", "d": [-0.2, -0.4, 0.0] }]
            })))
            .mount(&server)
            .await;

        let config = ScreenerConfig {
            signal_interval: "4h".to_string(),
            ..Default::default()
        };
        let client = ScannerClient::from_config(&config)
            .unwrap()
            .with_scan_url(format!("{}/america/scan", server.uri()));
        let rec = client.recommendation(&candidates(&["AAPL"])[0]).await.unwrap().unwrap();
        assert_eq!(rec.label, SignalClassification::Sell);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["columns"],
            json!(["Recommend.All|240", "Recommend.MA|240", "Recommend.Other|240"])
        );

        let bad = ScreenerConfig {
            signal_interval: "3d".to_string(),
            ..Default::default()
        };
        assert!(matches!(ScannerClient::from_config(&bad), Err(ScreenerError::ConfigError(_))));
    }

    #[test]
    fn test_interval_suffix() {
        assert_eq!(interval_suffix("1d").unwrap(), "");
        assert_eq!(interval_suffix("4h").unwrap(), "|240");
        assert!(interval_suffix("3d").is_err());
    }
}
