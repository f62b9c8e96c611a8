//! Universe resolution: which symbols a run looks at.
//!
//! Remote sources are tried in mode order, then the other mode, then a small
//! seed list. Resolution never fails; it only degrades to a smaller universe.

use screener_core::{normalize_symbols, TickerSymbol, UniverseMode, UniverseSource};
use std::collections::HashSet;
use std::sync::Arc;

/// Well-known liquid dividend payers used when every remote source fails.
pub const SEED_SYMBOLS: &[&str] = &["AAPL", "MSFT", "JNJ", "KO", "PEP", "O", "XOM", "CVX", "PG"];

pub struct UniverseResolver {
    full_market: Arc<dyn UniverseSource>,
    index: Arc<dyn UniverseSource>,
    mode: UniverseMode,
    max_symbols: Option<usize>,
}

impl UniverseResolver {
    pub fn new(
        full_market: Arc<dyn UniverseSource>,
        index: Arc<dyn UniverseSource>,
        mode: UniverseMode,
        max_symbols: Option<usize>,
    ) -> Self {
        Self {
            full_market,
            index,
            mode,
            max_symbols,
        }
    }

    pub async fn resolve(&self) -> Vec<TickerSymbol> {
        let order: [&Arc<dyn UniverseSource>; 2] = match self.mode {
            UniverseMode::FullMarket => [&self.full_market, &self.index],
            UniverseMode::IndexMembership => [&self.index, &self.full_market],
        };

        for source in order {
            match source.fetch_symbols().await {
                Ok(symbols) if !symbols.is_empty() => {
                    let symbols = dedupe_and_cap(symbols, self.max_symbols);
                    tracing::info!("Universe: {} symbols from {}", symbols.len(), source.name());
                    return symbols;
                }
                Ok(_) => tracing::warn!("Universe source {} returned no symbols", source.name()),
                Err(e) => tracing::warn!("Universe source {} failed: {}", source.name(), e),
            }
        }

        tracing::warn!("All universe sources failed, using {} seed symbols", SEED_SYMBOLS.len());
        seed_universe(self.max_symbols)
    }
}

/// Universe from an explicit list. Falls back to the seed list when nothing
/// in `raw` is a valid symbol.
pub fn explicit_universe<S: AsRef<str>>(raw: &[S], max_symbols: Option<usize>) -> Vec<TickerSymbol> {
    let symbols = normalize_symbols(raw.iter().map(|s| s.as_ref()));
    if symbols.is_empty() {
        tracing::warn!("No valid symbols in explicit list, using seed symbols");
        return seed_universe(max_symbols);
    }
    dedupe_and_cap(symbols, max_symbols)
}

pub fn seed_universe(max_symbols: Option<usize>) -> Vec<TickerSymbol> {
    dedupe_and_cap(normalize_symbols(SEED_SYMBOLS), max_symbols)
}

fn dedupe_and_cap(symbols: Vec<TickerSymbol>, max_symbols: Option<usize>) -> Vec<TickerSymbol> {
    let mut seen = HashSet::new();
    let mut out: Vec<TickerSymbol> = symbols.into_iter().filter(|s| seen.insert(s.clone())).collect();
    if let Some(max) = max_symbols {
        out.truncate(max.max(1));
    }
    out
}
