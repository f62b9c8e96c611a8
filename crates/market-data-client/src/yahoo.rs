//! Per-symbol fundamentals, daily closes and cash dividends from Yahoo Finance.
//!
//! Yahoo wants a session cookie plus a matching crumb on most endpoints. The
//! crumb is fetched once per client and shared by every clone; when it cannot
//! be obtained requests go out without one and may fail individually.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use screener_core::{
    DividendHistory, DividendPayment, FundamentalSnapshot, PricePoint, PriceSeries, RawYield,
    ScreenerConfig, ScreenerError, SymbolDataProvider, SymbolHistory, TickerSymbol,
    YieldConvention,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::{ensure_success, request_error, RateLimiter, USER_AGENT};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const SUMMARY_MODULES: &str = "price,summaryDetail,assetProfile";

#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    cookie_url: String,
    cookie_override: Option<String>,
    yield_convention: YieldConvention,
    crumb: Arc<OnceCell<Option<String>>>,
    rate_limiter: RateLimiter,
}

impl YahooClient {
    pub fn new(timeout: Duration, yield_convention: YieldConvention) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .unwrap_or_else(|_| Client::new());

        let crumb = OnceCell::new();
        if let Ok(value) = std::env::var("YAHOO_CRUMB") {
            let _ = crumb.set(Some(value));
        }

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            cookie_override: std::env::var("YAHOO_COOKIE").ok().filter(|c| !c.is_empty()),
            yield_convention,
            crumb: Arc::new(crumb),
            rate_limiter: RateLimiter::per_minute_from_env("YAHOO_RATE_LIMIT", 600),
        }
    }

    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            config.fundamentals_yield_convention,
        )
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_cookie_url(mut self, url: impl Into<String>) -> Self {
        self.cookie_url = url.into();
        self
    }

    /// Pin the crumb instead of fetching one. `None` disables the crumb.
    pub fn with_crumb(mut self, crumb: Option<String>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(crumb);
        self.crumb = Arc::new(cell);
        self
    }

    async fn crumb(&self) -> Option<String> {
        self.crumb
            .get_or_init(|| async {
                match self.fetch_crumb().await {
                    Ok(crumb) => Some(crumb),
                    Err(e) => {
                        tracing::warn!("Yahoo crumb unavailable, continuing without: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn fetch_crumb(&self) -> Result<String, ScreenerError> {
        // The cookie lands in the client's jar; the response itself is usually a 404.
        if let Err(e) = self.client.get(&self.cookie_url).send().await {
            tracing::debug!("Yahoo cookie request failed: {}", e);
        }

        let response = self
            .with_cookie(self.client.get(format!("{}/v1/test/getcrumb", self.base_url)))
            .header("referer", "https://finance.yahoo.com/")
            .send()
            .await
            .map_err(|e| request_error("crumb", e))?;
        let body = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(|e| request_error("crumb", e))?;

        let crumb = body.trim();
        if crumb.is_empty() || crumb.len() >= 100 || crumb.contains(' ') || crumb.contains('<') {
            return Err(ScreenerError::ParseError("unexpected crumb body".to_string()));
        }
        Ok(crumb.to_string())
    }

    fn with_cookie(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cookie_override {
            Some(cookie) => builder.header("cookie", cookie),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        mut query: Vec<(&'static str, String)>,
        context: &str,
    ) -> Result<T, ScreenerError> {
        if let Some(crumb) = self.crumb().await {
            query.push(("crumb", crumb));
        }

        self.rate_limiter.acquire().await;
        let response = self
            .with_cookie(self.client.get(url).query(&query))
            .send()
            .await
            .map_err(|e| request_error(context, e))?;

        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ScreenerError::ParseError(format!("{}: {}", context, e)))
    }
}

#[async_trait]
impl SymbolDataProvider for YahooClient {
    async fn fundamentals(&self, symbol: &TickerSymbol) -> Result<FundamentalSnapshot, ScreenerError> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        let body: SummaryResponse = self
            .get_json(&url, vec![("modules", SUMMARY_MODULES.to_string())], "quoteSummary")
            .await?;

        if let Some(err) = body.quote_summary.error.filter(|e| !e.is_null()) {
            return Err(ScreenerError::ApiError(format!("quoteSummary {}: {}", symbol, describe(&err))));
        }
        let result = body
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ScreenerError::MissingField(format!("quoteSummary result for {}", symbol)))?;

        Ok(summary_to_snapshot(result, self.yield_convention))
    }

    async fn history(&self, symbol: &TickerSymbol, years: u32) -> Result<SymbolHistory, ScreenerError> {
        let now = Utc::now();
        let start = now - ChronoDuration::days(365 * i64::from(years));
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let query = vec![
            ("period1", start.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
            ("events", "div".to_string()),
        ];

        let body: ChartResponse = self.get_json(&url, query, "chart").await?;
        if let Some(err) = body.chart.error.filter(|e| !e.is_null()) {
            return Err(ScreenerError::ApiError(format!("chart {}: {}", symbol, describe(&err))));
        }
        let result = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ScreenerError::InsufficientData(format!("no chart data for {}", symbol)))?;

        Ok(chart_to_history(result))
    }
}

fn describe(err: &Value) -> String {
    err.get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

fn summary_to_snapshot(result: SummaryResult, convention: YieldConvention) -> FundamentalSnapshot {
    let price = result.price.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();
    let profile = result.asset_profile.unwrap_or_default();

    FundamentalSnapshot {
        name: price.long_name.or(price.short_name).filter(|n| !n.trim().is_empty()),
        sector: profile.sector.filter(|s| !s.trim().is_empty()),
        price: raw(&price.regular_market_price).or_else(|| raw(&detail.previous_close)),
        market_cap: raw(&price.market_cap).or_else(|| raw(&detail.market_cap)),
        beta: raw(&detail.beta),
        dividend_yield: raw(&detail.dividend_yield).map(|v| RawYield::new(v, convention)),
        dividend_rate: raw(&detail.dividend_rate),
        ex_dividend_ts: raw(&detail.ex_dividend_date).map(|v| v as i64),
    }
}

fn chart_to_history(result: ChartResult) -> SymbolHistory {
    let timestamps = result.timestamp.unwrap_or_default();
    let closes = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .map(|q| q.close)
        .unwrap_or_default();

    let points = timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            Some(PricePoint {
                timestamp: DateTime::from_timestamp(*ts, 0)?,
                close: close?,
            })
        })
        .collect();

    let payments = result
        .events
        .map(|e| e.dividends)
        .unwrap_or_default()
        .into_values()
        .filter_map(|d| {
            Some(DividendPayment {
                timestamp: DateTime::from_timestamp(d.date, 0)?,
                amount: d.amount,
            })
        })
        .collect();

    SymbolHistory {
        prices: PriceSeries::new(points),
        dividends: DividendHistory::new(payments),
    }
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw).filter(|v| v.is_finite())
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(rename = "summaryDetail", default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(rename = "assetProfile", default)]
    asset_profile: Option<AssetProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(default)]
    regular_market_price: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default)]
    dividend_yield: Option<RawValue>,
    #[serde(default)]
    dividend_rate: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
    #[serde(default)]
    ex_dividend_date: Option<RawValue>,
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(default)]
    previous_close: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}
