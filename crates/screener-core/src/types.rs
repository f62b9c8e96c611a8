use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::ScreenerError;

/// Normalized ticker symbol.
///
/// Upper-case, with `-` as the share-class separator (`BRK-B`). Listing feeds
/// use `.` or `/` for the same thing; both are rewritten on parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerSymbol(String);

impl TickerSymbol {
    /// Parse and normalize a raw symbol. Returns `None` for strings that are not
    /// plain common-share tickers (preferreds like `ABR$D`, blanks, junk).
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace('.', "-").replace('/', "-");

        if normalized.is_empty() || normalized.len() > 12 {
            return None;
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return None;
        }
        if normalized.starts_with('-') || normalized.ends_with('-') {
            return None;
        }

        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form accepted by the bulk scanner, which keeps the class dot (`BRK.B`).
    pub fn scanner_form(&self) -> String {
        self.0.replace('-', ".")
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Parse, normalize and de-duplicate raw symbols, keeping first-seen order.
pub fn normalize_symbols<I, S>(raw: I) -> Vec<TickerSymbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|s| TickerSymbol::parse(s.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Primary-exchange qualifier used by providers that need venue disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Venue {
    Nasdaq,
    Nyse,
    Amex,
}

impl Venue {
    pub fn prefix(&self) -> &'static str {
        match self {
            Venue::Nasdaq => "NASDAQ",
            Venue::Nyse => "NYSE",
            Venue::Amex => "AMEX",
        }
    }
}

impl FromStr for Venue {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NASDAQ" => Ok(Venue::Nasdaq),
            "NYSE" => Ok(Venue::Nyse),
            "AMEX" | "NYSEAMERICAN" | "NYSE AMERICAN" => Ok(Venue::Amex),
            other => Err(ScreenerError::ConfigError(format!("unknown venue '{}'", other))),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A base symbol paired with one venue qualifier.
///
/// `priority` is the venue's index in the [`QualificationPlan`] that produced
/// it; lower wins when two forms of the same base symbol both return data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedSymbol {
    pub base: TickerSymbol,
    pub venue: Venue,
    pub priority: usize,
}

impl QualifiedSymbol {
    /// Wire form, e.g. `NYSE:BRK.B`.
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.venue.prefix(), self.base.scanner_form())
    }

    /// Split a wire form back into venue and base symbol.
    pub fn split(qualified: &str) -> Option<(Venue, TickerSymbol)> {
        let (prefix, symbol) = qualified.split_once(':')?;
        let venue = prefix.parse().ok()?;
        let base = TickerSymbol::parse(symbol)?;
        Some((venue, base))
    }
}

/// Ordered list of venue qualifiers tried for each symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualificationPlan {
    venues: Vec<Venue>,
}

impl Default for QualificationPlan {
    fn default() -> Self {
        Self {
            venues: vec![Venue::Nasdaq, Venue::Nyse],
        }
    }
}

impl QualificationPlan {
    /// Build a plan from an ordered venue list. Repeats are dropped; an empty
    /// list falls back to the default order.
    pub fn new(venues: Vec<Venue>) -> Self {
        let mut seen = HashSet::new();
        let venues: Vec<Venue> = venues.into_iter().filter(|v| seen.insert(*v)).collect();
        if venues.is_empty() {
            return Self::default();
        }
        Self { venues }
    }

    pub fn venues(&self) -> &[Venue] {
        &self.venues
    }

    /// All qualified forms of one symbol, in priority order.
    pub fn qualify(&self, symbol: &TickerSymbol) -> Vec<QualifiedSymbol> {
        self.venues
            .iter()
            .enumerate()
            .map(|(priority, venue)| QualifiedSymbol {
                base: symbol.clone(),
                venue: *venue,
                priority,
            })
            .collect()
    }

    /// Candidate list for a whole universe: each symbol followed by its forms.
    pub fn candidates(&self, symbols: &[TickerSymbol]) -> Vec<QualifiedSymbol> {
        symbols.iter().flat_map(|s| self.qualify(s)).collect()
    }
}

/// One daily close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Closing prices over the trailing window, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite());
        points.sort_by_key(|p| p.timestamp);
        Self { points }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_close(&self) -> Option<f64> {
        self.points.first().map(|p| p.close)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }
}

/// How a provider expresses dividend yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldConvention {
    /// Already scaled, `2.5` means 2.5%.
    Percent,
    /// Fraction of price, `0.025` means 2.5%.
    Fraction,
}

impl FromStr for YieldConvention {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "percent" | "pct" => Ok(YieldConvention::Percent),
            "fraction" | "decimal" => Ok(YieldConvention::Fraction),
            other => Err(ScreenerError::ConfigError(format!(
                "unknown yield convention '{}'",
                other
            ))),
        }
    }
}

/// A yield value tagged with the convention of the provider that supplied it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawYield {
    pub value: f64,
    pub convention: YieldConvention,
}

impl RawYield {
    pub fn new(value: f64, convention: YieldConvention) -> Self {
        Self { value, convention }
    }

    pub fn as_percent(&self) -> f64 {
        match self.convention {
            YieldConvention::Percent => self.value,
            YieldConvention::Fraction => self.value * 100.0,
        }
    }
}

/// Point-in-time facts for one symbol. Every field is optional because no
/// provider fills all of them reliably.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<RawYield>,
    /// Annualized dividend per share.
    pub dividend_rate: Option<f64>,
    /// Ex-dividend date, epoch seconds.
    pub ex_dividend_ts: Option<i64>,
}

impl FundamentalSnapshot {
    /// Fill every missing field from `fallback`. Fields already set win.
    pub fn or_fill(self, fallback: &FundamentalSnapshot) -> Self {
        Self {
            name: self.name.or_else(|| fallback.name.clone()),
            sector: self.sector.or_else(|| fallback.sector.clone()),
            price: self.price.or(fallback.price),
            market_cap: self.market_cap.or(fallback.market_cap),
            beta: self.beta.or(fallback.beta),
            dividend_yield: self.dividend_yield.or(fallback.dividend_yield),
            dividend_rate: self.dividend_rate.or(fallback.dividend_rate),
            ex_dividend_ts: self.ex_dividend_ts.or(fallback.ex_dividend_ts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendPayment {
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
}

/// Cash dividends, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DividendHistory {
    pub payments: Vec<DividendPayment>,
}

impl DividendHistory {
    pub fn new(mut payments: Vec<DividendPayment>) -> Self {
        payments.retain(|p| p.amount.is_finite());
        payments.sort_by_key(|p| p.timestamp);
        Self { payments }
    }

    /// Most recent payment amount.
    pub fn last_amount(&self) -> Option<f64> {
        self.payments.last().map(|p| p.amount)
    }

    pub fn has_payments(&self) -> bool {
        self.payments.iter().any(|p| p.amount > 0.0)
    }
}

/// Price and dividend history returned together by per-symbol providers.
#[derive(Debug, Clone, Default)]
pub struct SymbolHistory {
    pub prices: PriceSeries,
    pub dividends: DividendHistory,
}

/// One row from the bulk scanner.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub symbol: QualifiedSymbol,
    pub snapshot: FundamentalSnapshot,
    /// Raw recommendation score in [-1, 1].
    pub recommendation: Option<f64>,
}

/// Per-symbol technical rating.
#[derive(Debug, Clone)]
pub struct TechnicalRecommendation {
    pub score: f64,
    pub label: SignalClassification,
    pub moving_averages: Option<f64>,
    pub oscillators: Option<f64>,
}

/// Least-squares fit of close against day index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendStatistics {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub std_err: f64,
    pub observations: usize,
}

/// Technical recommendation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClassification {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
    /// No recommendation source answered. Never treated as neutral.
    Unknown,
}

impl SignalClassification {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if !s.is_finite() => SignalClassification::Unknown,
            s if s > 0.5 => SignalClassification::StrongBuy,
            s if s > 0.1 => SignalClassification::Buy,
            s if s < -0.5 => SignalClassification::StrongSell,
            s if s < -0.1 => SignalClassification::Sell,
            _ => SignalClassification::Neutral,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, SignalClassification::Unknown)
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            SignalClassification::StrongBuy => "STRONG_BUY",
            SignalClassification::Buy => "BUY",
            SignalClassification::Neutral => "NEUTRAL",
            SignalClassification::Sell => "SELL",
            SignalClassification::StrongSell => "STRONG_SELL",
            SignalClassification::Unknown => "UNKNOWN",
        }
    }
}

/// Which composite-score formula produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreModel {
    TrendYield,
    SignalAugmented,
}

/// Final per-symbol record as written to the output artifact.
///
/// Numeric fields are `Option` so that non-finite values can be replaced with
/// `null` before serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub symbol: TickerSymbol,
    pub name: Option<String>,
    pub exchange: Option<Venue>,
    pub sector: Option<String>,
    pub price: Option<f64>,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
    pub growth_5y_pct: Option<f64>,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub r_value: Option<f64>,
    pub r_squared: Option<f64>,
    pub p_value: Option<f64>,
    pub std_err: Option<f64>,
    pub observations: usize,
    pub dividend_yield_pct: Option<f64>,
    pub annual_dividend: Option<f64>,
    pub last_dividend: Option<f64>,
    pub est_next_payment: Option<f64>,
    pub ex_div_date: String,
    pub beta: Option<f64>,
    pub market_cap: Option<f64>,
    pub tv_signal: SignalClassification,
    pub score: Option<f64>,
    pub score_model: ScoreModel,
    /// Venue priority of the qualified form that supplied the record.
    #[serde(skip)]
    pub venue_priority: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub last_updated: String,
    pub total_analyzed: usize,
}

/// The single artifact a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerOutput {
    pub metadata: RunMetadata,
    pub data: Vec<ScoredResult>,
}
