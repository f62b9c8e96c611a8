//! Gating predicates. A symbol failing any gate is dropped, never scored.

use screener_core::{FundamentalSnapshot, ScreenerConfig};
use std::fmt;
use trend_analysis::SymbolMetrics;

/// The gate a symbol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gate {
    MarketCap,
    Beta,
    Slope,
    RSquared,
    DividendEvidence,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::MarketCap => "market_cap",
            Gate::Beta => "beta",
            Gate::Slope => "slope",
            Gate::RSquared => "r_squared",
            Gate::DividendEvidence => "dividend_evidence",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheap gates evaluated on bulk fields before any per-symbol call.
///
/// A missing market cap fails; a missing beta passes.
pub fn early_gates(snapshot: &FundamentalSnapshot, config: &ScreenerConfig) -> Result<(), Gate> {
    match snapshot.market_cap.filter(|c| c.is_finite()) {
        Some(cap) if cap >= config.min_market_cap => {}
        _ => return Err(Gate::MarketCap),
    }

    if let Some(beta) = snapshot.beta.filter(|b| b.is_finite()) {
        if beta > config.max_beta {
            return Err(Gate::Beta);
        }
    }

    Ok(())
}

/// Every gate, including trend quality and dividend evidence.
pub fn all_gates(
    snapshot: &FundamentalSnapshot,
    metrics: &SymbolMetrics,
    config: &ScreenerConfig,
) -> Result<(), Gate> {
    early_gates(snapshot, config)?;

    let trend = &metrics.trend;
    if !trend.slope.is_finite() || trend.slope <= config.min_slope {
        return Err(Gate::Slope);
    }
    if !trend.r_squared.is_finite() || trend.r_squared < config.min_r_squared {
        return Err(Gate::RSquared);
    }
    if !metrics.dividends.has_dividend_evidence() {
        return Err(Gate::DividendEvidence);
    }

    Ok(())
}
