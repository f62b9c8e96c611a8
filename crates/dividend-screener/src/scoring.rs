//! Composite 0-100 score. The variant is chosen per symbol by whether a
//! recommendation signal is known.

use screener_core::{ScoreModel, SignalClassification};
use trend_analysis::SymbolMetrics;

/// Bonus or penalty the external signal adds to the augmented score.
pub fn signal_bonus(signal: SignalClassification) -> f64 {
    match signal {
        SignalClassification::StrongBuy => 30.0,
        SignalClassification::Buy => 15.0,
        SignalClassification::Sell => -10.0,
        // Strong sell carries no penalty in the canonical formula.
        SignalClassification::StrongSell
        | SignalClassification::Neutral
        | SignalClassification::Unknown => 0.0,
    }
}

/// `r² × 70 + min(yield_pct, 10) × 3`, clamped to [0, 100].
pub fn trend_yield_score(r_squared: f64, yield_pct: f64) -> f64 {
    (r_squared * 70.0 + yield_pct.min(10.0) * 3.0).clamp(0.0, 100.0)
}

/// `r² × 50 + min(yield_fraction, 0.10) × 200 + bonus`, clamped to [0, 100].
pub fn signal_augmented_score(r_squared: f64, yield_fraction: f64, signal: SignalClassification) -> f64 {
    (r_squared * 50.0 + yield_fraction.min(0.10) * 200.0 + signal_bonus(signal)).clamp(0.0, 100.0)
}

/// Score one symbol and report which variant produced it.
pub fn composite_score(metrics: &SymbolMetrics) -> (f64, ScoreModel) {
    let r_squared = metrics.trend.r_squared;
    let yield_pct = metrics.dividends.yield_pct;

    if metrics.signal.is_known() {
        (
            signal_augmented_score(r_squared, yield_pct / 100.0, metrics.signal),
            ScoreModel::SignalAugmented,
        )
    } else {
        (trend_yield_score(r_squared, yield_pct), ScoreModel::TrendYield)
    }
}
