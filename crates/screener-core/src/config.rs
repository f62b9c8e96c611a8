use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{QualificationPlan, ScreenerError, Venue, YieldConvention};

/// Where the candidate universe comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseMode {
    /// Every exchange-traded common stock from the listing directory.
    FullMarket,
    /// Constituents of a named index.
    IndexMembership,
}

impl FromStr for UniverseMode {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "full_market" | "market" => Ok(UniverseMode::FullMarket),
            "index" | "index_membership" | "sp500" => Ok(UniverseMode::IndexMembership),
            other => Err(ScreenerError::ConfigError(format!("unknown universe mode '{}'", other))),
        }
    }
}

/// Immutable per-run configuration, passed into every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    // Universe
    pub universe_mode: UniverseMode,
    pub max_symbols: Option<usize>,
    pub venues: Vec<Venue>,

    // Acquisition
    pub use_bulk_scanner: bool,
    pub use_recommendations: bool,
    pub signal_interval: String,    // rating timeframe, e.g. 1d, 4h, 1W
    pub chunk_size: usize,          // qualified symbols per bulk request
    pub chunk_delay_ms: u64,        // pause between bulk requests
    pub request_timeout_secs: u64,
    pub history_years: u32,
    pub workers_small: usize,
    pub workers_large: usize,
    pub max_workers: usize,
    pub large_universe_threshold: usize,

    // Metrics
    pub min_observations: usize,
    pub payment_tolerance: f64,
    pub scanner_yield_convention: YieldConvention,
    pub fundamentals_yield_convention: YieldConvention,

    // Gates
    pub min_market_cap: f64,
    pub max_beta: f64,
    pub min_slope: f64,
    pub min_r_squared: f64,

    // Output
    pub output_path: String,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            universe_mode: UniverseMode::IndexMembership,
            max_symbols: None,
            venues: vec![Venue::Nasdaq, Venue::Nyse],

            use_bulk_scanner: true,
            use_recommendations: true,
            signal_interval: "1d".to_string(),
            chunk_size: 200,
            chunk_delay_ms: 500,
            request_timeout_secs: 20,
            history_years: 5,
            workers_small: 10,
            workers_large: 32,
            max_workers: 32,
            large_universe_threshold: 600,

            min_observations: 200,
            payment_tolerance: 0.1,
            scanner_yield_convention: YieldConvention::Percent,
            fundamentals_yield_convention: YieldConvention::Fraction,

            min_market_cap: 5_000_000_000.0,
            max_beta: 1.5,
            min_slope: 0.0,
            min_r_squared: 0.5,

            output_path: "stocks_data.json".to_string(),
        }
    }
}

impl ScreenerConfig {
    /// Load from `SCREENER_*` environment variables, defaulting anything unset.
    pub fn from_env() -> Result<Self, ScreenerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScreenerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = Self::default();

        let venues = match get("SCREENER_VENUES") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(Venue::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => d.venues,
        };

        let max_symbols = match get("SCREENER_TICKER_LIMIT") {
            Some(v) => {
                let limit: usize = parse_value("SCREENER_TICKER_LIMIT", &v)?;
                (limit > 0).then_some(limit)
            }
            None => d.max_symbols,
        };

        let config = Self {
            universe_mode: parse_or(&get, "SCREENER_UNIVERSE", d.universe_mode)?,
            max_symbols,
            venues,

            use_bulk_scanner: parse_or(&get, "SCREENER_USE_SCANNER", d.use_bulk_scanner)?,
            use_recommendations: parse_or(&get, "SCREENER_USE_RECOMMENDATIONS", d.use_recommendations)?,
            signal_interval: get("SCREENER_SIGNAL_INTERVAL")
                .map(|v| v.trim().to_string())
                .unwrap_or(d.signal_interval),
            chunk_size: parse_or(&get, "SCREENER_CHUNK_SIZE", d.chunk_size)?,
            chunk_delay_ms: parse_or(&get, "SCREENER_CHUNK_DELAY_MS", d.chunk_delay_ms)?,
            request_timeout_secs: parse_or(&get, "SCREENER_REQUEST_TIMEOUT", d.request_timeout_secs)?,
            history_years: parse_or(&get, "SCREENER_HISTORY_YEARS", d.history_years)?,
            workers_small: parse_or(&get, "SCREENER_WORKERS_SMALL", d.workers_small)?,
            workers_large: parse_or(&get, "SCREENER_WORKERS_LARGE", d.workers_large)?,
            max_workers: parse_or(&get, "SCREENER_MAX_WORKERS", d.max_workers)?,
            large_universe_threshold: parse_or(&get, "SCREENER_LARGE_UNIVERSE", d.large_universe_threshold)?,

            min_observations: parse_or(&get, "SCREENER_MIN_OBSERVATIONS", d.min_observations)?,
            payment_tolerance: parse_or(&get, "SCREENER_PAYMENT_TOLERANCE", d.payment_tolerance)?,
            scanner_yield_convention: parse_or(&get, "SCREENER_SCANNER_YIELD", d.scanner_yield_convention)?,
            fundamentals_yield_convention: parse_or(
                &get,
                "SCREENER_FUNDAMENTALS_YIELD",
                d.fundamentals_yield_convention,
            )?,

            min_market_cap: parse_or(&get, "SCREENER_MIN_MARKET_CAP", d.min_market_cap)?,
            max_beta: parse_or(&get, "SCREENER_MAX_BETA", d.max_beta)?,
            min_slope: parse_or(&get, "SCREENER_MIN_SLOPE", d.min_slope)?,
            min_r_squared: parse_or(&get, "SCREENER_MIN_R_SQUARED", d.min_r_squared)?,

            output_path: get("SCREENER_OUTPUT").unwrap_or(d.output_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ScreenerError> {
        if self.chunk_size == 0 {
            return Err(ScreenerError::ConfigError("chunk_size must be positive".to_string()));
        }
        if self.min_observations < 3 {
            return Err(ScreenerError::ConfigError(
                "min_observations must be at least 3".to_string(),
            ));
        }
        if self.history_years == 0 {
            return Err(ScreenerError::ConfigError("history_years must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_r_squared) {
            return Err(ScreenerError::ConfigError(
                "min_r_squared must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn qualification_plan(&self) -> QualificationPlan {
        QualificationPlan::new(self.venues.clone())
    }

    /// Worker pool size for a universe of `universe_len` symbols.
    pub fn worker_count(&self, universe_len: usize) -> usize {
        let base = if universe_len > self.large_universe_threshold {
            self.workers_large
        } else {
            self.workers_small
        };
        base.min(self.max_workers).min(universe_len).max(1)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ScreenerError> {
    raw.trim()
        .parse()
        .map_err(|_| ScreenerError::ConfigError(format!("invalid value '{}' for {}", raw, key)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ScreenerError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ScreenerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.universe_mode, UniverseMode::IndexMembership);
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.min_observations, 200);
        assert_eq!(config.scanner_yield_convention, YieldConvention::Percent);
        assert_eq!(config.fundamentals_yield_convention, YieldConvention::Fraction);
        assert_eq!(config.output_path, "stocks_data.json");
        assert_eq!(config.signal_interval, "1d");
        assert!(config.max_symbols.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ScreenerConfig::from_lookup(lookup(&[
            ("SCREENER_UNIVERSE", "full"),
            ("SCREENER_VENUES", "nyse, amex"),
            ("SCREENER_MIN_R_SQUARED", "0.8"),
            ("SCREENER_TICKER_LIMIT", "600"),
            ("SCREENER_USE_SCANNER", "false"),
            ("SCREENER_OUTPUT", "out.json"),
            ("SCREENER_SIGNAL_INTERVAL", " 4h "),
        ]))
        .unwrap();
        assert_eq!(config.universe_mode, UniverseMode::FullMarket);
        assert_eq!(config.venues, vec![Venue::Nyse, Venue::Amex]);
        assert!((config.min_r_squared - 0.8).abs() < 1e-12);
        assert_eq!(config.max_symbols, Some(600));
        assert!(!config.use_bulk_scanner);
        assert_eq!(config.output_path, "out.json");
        assert_eq!(config.signal_interval, "4h");
    }

    #[test]
    fn test_zero_ticker_limit_means_unlimited() {
        let config = ScreenerConfig::from_lookup(lookup(&[("SCREENER_TICKER_LIMIT", "0")])).unwrap();
        assert!(config.max_symbols.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ScreenerConfig::from_lookup(lookup(&[("SCREENER_CHUNK_SIZE", "abc")])).is_err());
        assert!(ScreenerConfig::from_lookup(lookup(&[("SCREENER_CHUNK_SIZE", "0")])).is_err());
        assert!(ScreenerConfig::from_lookup(lookup(&[("SCREENER_VENUES", "LSE")])).is_err());
        assert!(ScreenerConfig::from_lookup(lookup(&[("SCREENER_MIN_R_SQUARED", "1.5")])).is_err());
    }

    #[test]
    fn test_worker_count_scales_with_universe() {
        let config = ScreenerConfig::default();
        assert_eq!(config.worker_count(0), 1);
        assert_eq!(config.worker_count(5), 5);
        assert_eq!(config.worker_count(500), 10);
        assert_eq!(config.worker_count(5000), 32);

        let capped = ScreenerConfig {
            max_workers: 16,
            ..ScreenerConfig::default()
        };
        assert_eq!(capped.worker_count(5000), 16);
    }
}
