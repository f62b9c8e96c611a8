//! Per-symbol metric derivation: trend fit, dividend metrics and signal bucket.

pub mod dividends;
pub mod regression;
pub mod signal;

use screener_core::{
    DividendHistory, FundamentalSnapshot, PriceSeries, ScreenerConfig, ScreenerError,
    SignalClassification, TrendStatistics,
};
use serde::Serialize;

pub use dividends::{annual_dividend, estimate_next_payment, format_ex_dividend, yield_percent};
pub use regression::fit_trend;
pub use signal::classify;

/// Raw inputs for one symbol. Borrowed: the task owning the symbol keeps them.
#[derive(Debug, Clone, Copy)]
pub struct MetricInputs<'a> {
    pub prices: &'a PriceSeries,
    pub snapshot: &'a FundamentalSnapshot,
    pub dividends: &'a DividendHistory,
    pub recommendation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DividendMetrics {
    /// Yield as a percentage of price, 0 when unknown.
    pub yield_pct: f64,
    pub annual_dividend: Option<f64>,
    pub last_payment: Option<f64>,
    pub est_next_payment: f64,
    pub ex_div_date: String,
    /// At least one positive payment anywhere in the history window.
    pub paid_in_window: bool,
}

impl DividendMetrics {
    /// Any evidence the symbol pays a dividend at all.
    pub fn has_dividend_evidence(&self) -> bool {
        self.yield_pct > 0.0 || self.paid_in_window || self.last_payment.map_or(false, |p| p > 0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolMetrics {
    pub trend: TrendStatistics,
    pub dividends: DividendMetrics,
    pub signal: SignalClassification,
    /// Latest price: snapshot price, or the last close.
    pub price: Option<f64>,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
    pub growth_pct: Option<f64>,
}

pub struct MetricEngine {
    min_observations: usize,
    payment_tolerance: f64,
}

impl MetricEngine {
    pub fn new(min_observations: usize, payment_tolerance: f64) -> Self {
        Self {
            min_observations,
            payment_tolerance,
        }
    }

    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self::new(config.min_observations, config.payment_tolerance)
    }

    /// Derive every metric for one symbol. Fails when the price window is too
    /// short for a trend fit.
    pub fn compute(&self, inputs: MetricInputs<'_>) -> Result<SymbolMetrics, ScreenerError> {
        let trend = fit_trend(&inputs.prices.closes(), self.min_observations)?;
        tracing::debug!(
            "trend fit: n={} slope={:.4} r2={:.4} p={:.3e}",
            trend.observations,
            trend.slope,
            trend.r_squared,
            trend.p_value
        );

        let start_price = inputs.prices.first_close();
        let end_price = inputs.prices.last_close();
        let price = inputs
            .snapshot
            .price
            .filter(|p| p.is_finite() && *p > 0.0)
            .or(end_price);

        let growth_pct = match (start_price, end_price) {
            (Some(start), Some(end)) if start > 0.0 => Some((end / start - 1.0) * 100.0),
            _ => None,
        };

        let yield_pct = yield_percent(inputs.snapshot.dividend_yield);
        let last_payment = inputs.dividends.last_amount();
        let rate = inputs.snapshot.dividend_rate;

        let dividends = DividendMetrics {
            yield_pct: yield_pct.unwrap_or(0.0),
            annual_dividend: annual_dividend(rate, yield_pct, price),
            last_payment,
            est_next_payment: estimate_next_payment(rate, last_payment, self.payment_tolerance),
            ex_div_date: format_ex_dividend(inputs.snapshot.ex_dividend_ts),
            paid_in_window: inputs.dividends.has_payments(),
        };

        Ok(SymbolMetrics {
            trend,
            dividends,
            signal: classify(inputs.recommendation),
            price,
            start_price,
            end_price,
            growth_pct,
        })
    }
}
