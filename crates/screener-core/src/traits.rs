use async_trait::async_trait;
use crate::{
    FundamentalSnapshot, QualifiedSymbol, ScanRecord, ScreenerError, SymbolHistory,
    TechnicalRecommendation, TickerSymbol,
};

/// A remote source of candidate symbols (listing directory, index page).
#[async_trait]
pub trait UniverseSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_symbols(&self) -> Result<Vec<TickerSymbol>, ScreenerError>;
}

/// Bulk provider answering many qualified symbols per request.
#[async_trait]
pub trait BulkScanner: Send + Sync {
    /// Fetch one chunk. Forms the provider does not know are simply absent
    /// from the returned records.
    async fn scan(&self, symbols: &[QualifiedSymbol]) -> Result<Vec<ScanRecord>, ScreenerError>;
}

/// Single-symbol fundamentals and history lookups.
#[async_trait]
pub trait SymbolDataProvider: Send + Sync {
    async fn fundamentals(&self, symbol: &TickerSymbol) -> Result<FundamentalSnapshot, ScreenerError>;

    /// Daily closes and cash dividends over the trailing `years`.
    async fn history(&self, symbol: &TickerSymbol, years: u32) -> Result<SymbolHistory, ScreenerError>;
}

/// Single-symbol technical recommendation lookups.
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// `Ok(None)` when the provider has no data for this qualified form.
    async fn recommendation(
        &self,
        symbol: &QualifiedSymbol,
    ) -> Result<Option<TechnicalRecommendation>, ScreenerError>;
}
