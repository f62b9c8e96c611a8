//! Data acquisition: the batched bulk scan and the per-symbol fetches.

use screener_core::{
    BulkScanner, FundamentalSnapshot, QualificationPlan, QualifiedSymbol, RecommendationProvider,
    ScanRecord, ScreenerError, SymbolDataProvider, SymbolHistory, TechnicalRecommendation,
    TickerSymbol,
};
use std::collections::HashMap;
use std::time::Duration;

/// Flattened result of a batched scan.
#[derive(Debug, Default)]
pub struct ScanBatch {
    pub records: Vec<ScanRecord>,
    pub chunks_sent: usize,
    pub chunks_failed: usize,
}

/// Scan `candidates` in chunks of `chunk_size`, one request at a time with
/// `delay` between requests. A failed chunk is logged and skipped.
pub async fn scan_in_chunks(
    scanner: &dyn BulkScanner,
    candidates: &[QualifiedSymbol],
    chunk_size: usize,
    delay: Duration,
) -> ScanBatch {
    let mut batch = ScanBatch::default();
    let total_chunks = candidates.len().div_ceil(chunk_size.max(1));

    for (i, chunk) in candidates.chunks(chunk_size.max(1)).enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        batch.chunks_sent += 1;

        match scanner.scan(chunk).await {
            Ok(records) => {
                tracing::debug!("Scan chunk {}/{}: {} records", i + 1, total_chunks, records.len());
                batch.records.extend(records);
            }
            Err(e) => {
                batch.chunks_failed += 1;
                tracing::warn!("Scan chunk {}/{} failed, skipping: {}", i + 1, total_chunks, e);
            }
        }
    }

    batch
}

/// Reduce scan records to one per base symbol. The lowest venue priority
/// wins; among equal priorities the first record is kept. Output follows the
/// order in which base symbols first appeared.
pub fn best_by_priority(records: Vec<ScanRecord>) -> Vec<ScanRecord> {
    let mut kept: Vec<ScanRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<TickerSymbol, usize> = HashMap::new();

    for record in records {
        match index.get(&record.symbol.base) {
            Some(&i) => {
                if record.symbol.priority < kept[i].symbol.priority {
                    kept[i] = record;
                }
            }
            None => {
                index.insert(record.symbol.base.clone(), kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

/// Try each qualified form in priority order and keep the first one that
/// answers with data. Errors on one form fall through to the next.
pub async fn first_recommendation(
    provider: &dyn RecommendationProvider,
    plan: &QualificationPlan,
    symbol: &TickerSymbol,
) -> Option<(QualifiedSymbol, TechnicalRecommendation)> {
    for form in plan.qualify(symbol) {
        match provider.recommendation(&form).await {
            Ok(Some(rec)) => {
                tracing::debug!(
                    "{} rated {} via {} (MA {:?}, oscillators {:?})",
                    symbol,
                    rec.label.to_label(),
                    form.qualified(),
                    rec.moving_averages,
                    rec.oscillators
                );
                return Some((form, rec));
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Recommendation for {} failed: {}", form.qualified(), e),
        }
    }
    None
}

/// Fetch fundamentals and history for one symbol concurrently.
///
/// A failed fundamentals call falls back to the scan record's snapshot when
/// there is one. A failed history call always fails the symbol.
pub async fn fetch_symbol_data(
    provider: &dyn SymbolDataProvider,
    symbol: &TickerSymbol,
    history_years: u32,
    scan: Option<&ScanRecord>,
) -> Result<(FundamentalSnapshot, SymbolHistory), ScreenerError> {
    let (fundamentals, history) = tokio::join!(
        provider.fundamentals(symbol),
        provider.history(symbol, history_years),
    );

    let history = history?;

    let snapshot = match (fundamentals, scan) {
        (Ok(snapshot), Some(scan)) => snapshot.or_fill(&scan.snapshot),
        (Ok(snapshot), None) => snapshot,
        (Err(e), Some(scan)) => {
            tracing::debug!("{} fundamentals failed, using scan record: {}", symbol, e);
            scan.snapshot.clone()
        }
        (Err(e), None) => return Err(e),
    };

    Ok((snapshot, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use screener_core::{SignalClassification, Venue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sym(s: &str) -> TickerSymbol {
        TickerSymbol::parse(s).unwrap()
    }

    fn record(form: &QualifiedSymbol, cap: f64) -> ScanRecord {
        ScanRecord {
            symbol: form.clone(),
            snapshot: FundamentalSnapshot {
                market_cap: Some(cap),
                price: Some(10.0),
                ..Default::default()
            },
            recommendation: None,
        }
    }

    /// Answers every requested form; fails any chunk containing `fail_on`.
    struct EchoScanner {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BulkScanner for EchoScanner {
        async fn scan(&self, symbols: &[QualifiedSymbol]) -> Result<Vec<ScanRecord>, ScreenerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbols.iter().any(|s| Some(s.base.as_str()) == self.fail_on) {
                return Err(ScreenerError::ApiError("HTTP 502".to_string()));
            }
            Ok(symbols.iter().map(|s| record(s, 1e10)).collect())
        }
    }

    #[tokio::test]
    async fn test_chunks_sent_and_failures_skipped() {
        let plan = QualificationPlan::default();
        let candidates = plan.candidates(&[sym("KO"), sym("BAD"), sym("PEP")]);
        let scanner = EchoScanner {
            fail_on: Some("BAD"),
            calls: AtomicUsize::new(0),
        };

        let batch = scan_in_chunks(&scanner, &candidates, 2, Duration::ZERO).await;

        assert_eq!(scanner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batch.chunks_sent, 3);
        assert_eq!(batch.chunks_failed, 1);
        assert_eq!(batch.records.len(), 4);
        assert!(batch.records.iter().all(|r| r.symbol.base.as_str() != "BAD"));
    }

    #[test]
    fn test_best_by_priority_ignores_arrival_order() {
        let plan = QualificationPlan::default();
        let ko = plan.qualify(&sym("KO"));
        let pep = plan.qualify(&sym("PEP"));

        let reduced = best_by_priority(vec![
            record(&ko[1], 1.0),
            record(&pep[0], 2.0),
            record(&ko[0], 3.0),
            record(&pep[0], 4.0),
        ]);

        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].symbol.base.as_str(), "KO");
        assert_eq!(reduced[0].symbol.venue, Venue::Nasdaq);
        assert_eq!(reduced[0].snapshot.market_cap, Some(3.0));
        assert_eq!(reduced[1].snapshot.market_cap, Some(2.0));
    }

    struct NyseOnlyRatings;

    #[async_trait]
    impl RecommendationProvider for NyseOnlyRatings {
        async fn recommendation(
            &self,
            symbol: &QualifiedSymbol,
        ) -> Result<Option<TechnicalRecommendation>, ScreenerError> {
            match symbol.venue {
                Venue::Nasdaq => Ok(None),
                _ => Ok(Some(TechnicalRecommendation {
                    score: 0.3,
                    label: SignalClassification::Buy,
                    moving_averages: None,
                    oscillators: None,
                })),
            }
        }
    }

    #[tokio::test]
    async fn test_first_recommendation_tries_forms_in_order() {
        let plan = QualificationPlan::default();
        let (form, rec) = first_recommendation(&NyseOnlyRatings, &plan, &sym("KO")).await.unwrap();
        assert_eq!(form.venue, Venue::Nyse);
        assert_eq!(form.priority, 1);
        assert_eq!(rec.label, SignalClassification::Buy);

        let nasdaq_only = QualificationPlan::new(vec![Venue::Nasdaq]);
        assert!(first_recommendation(&NyseOnlyRatings, &nasdaq_only, &sym("KO")).await.is_none());
    }

    struct HalfBrokenData {
        fundamentals_ok: bool,
        history_ok: bool,
    }

    #[async_trait]
    impl SymbolDataProvider for HalfBrokenData {
        async fn fundamentals(&self, _symbol: &TickerSymbol) -> Result<FundamentalSnapshot, ScreenerError> {
            if self.fundamentals_ok {
                Ok(FundamentalSnapshot {
                    beta: Some(0.7),
                    ..Default::default()
                })
            } else {
                Err(ScreenerError::Timeout("quoteSummary".to_string()))
            }
        }

        async fn history(&self, _symbol: &TickerSymbol, _years: u32) -> Result<SymbolHistory, ScreenerError> {
            if self.history_ok {
                Ok(SymbolHistory::default())
            } else {
                Err(ScreenerError::ApiError("HTTP 404".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_symbol_data_fallbacks() {
        let form = &QualificationPlan::default().qualify(&sym("KO"))[0];
        let scan = record(form, 7e10);

        let provider = HalfBrokenData { fundamentals_ok: true, history_ok: true };
        let (snap, _) = fetch_symbol_data(&provider, &sym("KO"), 5, Some(&scan)).await.unwrap();
        assert_eq!(snap.beta, Some(0.7));
        assert_eq!(snap.market_cap, Some(7e10));

        let provider = HalfBrokenData { fundamentals_ok: false, history_ok: true };
        let (snap, _) = fetch_symbol_data(&provider, &sym("KO"), 5, Some(&scan)).await.unwrap();
        assert_eq!(snap.market_cap, Some(7e10));
        assert!(fetch_symbol_data(&provider, &sym("KO"), 5, None).await.is_err());

        let provider = HalfBrokenData { fundamentals_ok: true, history_ok: false };
        assert!(fetch_symbol_data(&provider, &sym("KO"), 5, Some(&scan)).await.is_err());
    }
}
