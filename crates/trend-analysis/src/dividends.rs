//! Dividend yield normalization, next-payment estimation and ex-date formatting.

use chrono::DateTime;
use screener_core::RawYield;

/// Marker written when an ex-dividend date is unknown.
pub const NOT_AVAILABLE: &str = "N/A";

/// Yield as a percentage of price. Negative or non-finite values count as absent.
pub fn yield_percent(raw: Option<RawYield>) -> Option<f64> {
    raw.map(|y| y.as_percent())
        .filter(|pct| pct.is_finite() && *pct >= 0.0)
}

/// Annual dividend per share: the provider's rate when present, otherwise
/// derived from yield and price.
pub fn annual_dividend(rate: Option<f64>, yield_pct: Option<f64>, price: Option<f64>) -> Option<f64> {
    if let Some(rate) = rate.filter(|r| r.is_finite() && *r > 0.0) {
        return Some(rate);
    }
    match (yield_pct, price) {
        (Some(pct), Some(price)) if pct > 0.0 && price > 0.0 => Some(pct / 100.0 * price),
        _ => None,
    }
}

/// Estimate the next payment.
///
/// When the annual rate is about four times the last payment (within
/// `tolerance`), the last payment is trusted. Otherwise a quarter of the annual
/// rate is used. Without a rate the last payment stands, or zero.
pub fn estimate_next_payment(annual_rate: Option<f64>, last_payment: Option<f64>, tolerance: f64) -> f64 {
    let rate = annual_rate.filter(|r| r.is_finite() && *r > 0.0);
    let last = last_payment.filter(|p| p.is_finite() && *p >= 0.0);

    match (rate, last) {
        (Some(rate), Some(last)) if (rate - last * 4.0).abs() <= tolerance => last,
        (Some(rate), _) => rate / 4.0,
        (None, last) => last.unwrap_or(0.0),
    }
}

/// Format an epoch timestamp as `YYYY-MM-DD` (UTC).
///
/// Values above 10^11 are taken as milliseconds. Zero, negative or
/// unconvertible values yield [`NOT_AVAILABLE`].
pub fn format_ex_dividend(timestamp: Option<i64>) -> String {
    let Some(ts) = timestamp.filter(|ts| *ts > 0) else {
        return NOT_AVAILABLE.to_string();
    };

    let parsed = if ts > 100_000_000_000 {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    };

    parsed
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
