//! End-to-end run: bulk scan, early gates, per-symbol enrichment on a bounded
//! worker pool, scoring and aggregation.

use chrono::Utc;
use screener_core::{
    BulkScanner, FundamentalSnapshot, QualifiedSymbol, RecommendationProvider, ScanRecord,
    ScoredResult, ScreenerConfig, ScreenerOutput, SymbolDataProvider, SymbolHistory, TickerSymbol,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use trend_analysis::{MetricEngine, MetricInputs};

use crate::acquisition::{best_by_priority, fetch_symbol_data, first_recommendation, scan_in_chunks};
use crate::aggregator::build_output;
use crate::filters::{all_gates, early_gates, Gate};
use crate::scoring::composite_score;

/// Why a symbol contributed nothing to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// Failed a gate.
    Filtered(Gate),
    /// Fetch or derive failed; carries the error kind.
    Failed(&'static str),
    /// The bulk scan returned no data-bearing record for any qualified form.
    NotScanned,
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::Filtered(gate) => write!(f, "filtered:{}", gate),
            AbsentReason::Failed(kind) => write!(f, "failed:{}", kind),
            AbsentReason::NotScanned => f.write_str("not_scanned"),
        }
    }
}

/// Result of one isolated per-symbol unit of work.
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Ready(T),
    Absent(AbsentReason),
}

/// The providers a run draws from. Any of the optional ones may be switched off.
#[derive(Clone)]
pub struct Providers {
    pub scanner: Option<Arc<dyn BulkScanner>>,
    pub symbol_data: Arc<dyn SymbolDataProvider>,
    pub recommendations: Option<Arc<dyn RecommendationProvider>>,
}

/// One symbol queued for per-symbol enrichment.
#[derive(Debug, Clone)]
pub struct EnrichmentTask {
    pub symbol: TickerSymbol,
    pub scan: Option<ScanRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub considered: usize,
    pub scan_records: usize,
    pub chunks_failed: usize,
    pub candidates: usize,
    pub retained: usize,
    pub absent: BTreeMap<String, usize>,
}

impl RunSummary {
    fn record_absent(&mut self, reason: AbsentReason) {
        *self.absent.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn absent_total(&self) -> usize {
        self.absent.values().sum()
    }

    pub fn log(&self) {
        tracing::info!(
            "Run summary: {} considered, {} scan records ({} chunks failed), {} enriched, {} retained",
            self.considered,
            self.scan_records,
            self.chunks_failed,
            self.candidates,
            self.retained
        );
        for (reason, count) in &self.absent {
            tracing::info!("  absent {}: {}", reason, count);
        }
    }
}

pub struct Pipeline {
    config: Arc<ScreenerConfig>,
    providers: Providers,
    engine: Arc<MetricEngine>,
    workers: Option<usize>,
}

impl Pipeline {
    pub fn new(config: ScreenerConfig, providers: Providers) -> Self {
        let engine = MetricEngine::from_config(&config);
        Self {
            config: Arc::new(config),
            providers,
            engine: Arc::new(engine),
            workers: None,
        }
    }

    /// Fix the worker pool size instead of scaling it with the universe.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub async fn run(&self, universe: &[TickerSymbol]) -> (ScreenerOutput, RunSummary) {
        let mut summary = RunSummary {
            considered: universe.len(),
            ..Default::default()
        };

        let tasks = match (&self.providers.scanner, self.config.use_bulk_scanner) {
            (Some(scanner), true) => self.bulk_pass(scanner.as_ref(), universe, &mut summary).await,
            _ => universe
                .iter()
                .map(|symbol| EnrichmentTask {
                    symbol: symbol.clone(),
                    scan: None,
                })
                .collect(),
        };
        summary.candidates = tasks.len();

        let mut results = Vec::new();
        for outcome in self.enrich(tasks).await {
            match outcome {
                TaskOutcome::Ready(result) => results.push(result),
                TaskOutcome::Absent(reason) => summary.record_absent(reason),
            }
        }

        let output = build_output(results, universe.len(), Utc::now());
        summary.retained = output.data.len();
        (output, summary)
    }

    /// Scan the universe in chunks, reduce to one record per symbol and apply
    /// the cheap gates. Survivors become enrichment tasks.
    async fn bulk_pass(
        &self,
        scanner: &dyn BulkScanner,
        universe: &[TickerSymbol],
        summary: &mut RunSummary,
    ) -> Vec<EnrichmentTask> {
        let plan = self.config.qualification_plan();
        let candidates = plan.candidates(universe);
        tracing::info!(
            "Bulk scan: {} symbols as {} qualified forms, chunks of {}",
            universe.len(),
            candidates.len(),
            self.config.chunk_size
        );

        let batch = scan_in_chunks(
            scanner,
            &candidates,
            self.config.chunk_size,
            Duration::from_millis(self.config.chunk_delay_ms),
        )
        .await;
        summary.scan_records = batch.records.len();
        summary.chunks_failed = batch.chunks_failed;

        let records = best_by_priority(batch.records);
        for _ in records.len()..universe.len() {
            summary.record_absent(AbsentReason::NotScanned);
        }

        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            match early_gates(&record.snapshot, &self.config) {
                Ok(()) => tasks.push(EnrichmentTask {
                    symbol: record.symbol.base.clone(),
                    scan: Some(record),
                }),
                Err(gate) => summary.record_absent(AbsentReason::Filtered(gate)),
            }
        }
        tracing::info!("Bulk scan: {} candidates pass early gates", tasks.len());
        tasks
    }

    /// Run every task on the bounded pool. Outcomes come back in task order,
    /// whatever order the tasks finish in.
    async fn enrich(&self, tasks: Vec<EnrichmentTask>) -> Vec<TaskOutcome<ScoredResult>> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.workers.unwrap_or_else(|| self.config.worker_count(total));
        tracing::info!("Enriching {} symbols with {} workers", total, workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let completed = Arc::new(AtomicU64::new(0));
        let absent = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(total);

        for task in tasks {
            let providers = self.providers.clone();
            let config = Arc::clone(&self.config);
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let absent = Arc::clone(&absent);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return TaskOutcome::Absent(AbsentReason::Failed("cancelled"));
                };

                let symbol = task.symbol.clone();
                let outcome = evaluate_symbol(&providers, &config, &engine, task).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                match &outcome {
                    TaskOutcome::Ready(result) => tracing::info!(
                        "[{}/{}] {} => score {:.2} ({})",
                        done,
                        total,
                        symbol,
                        result.score.unwrap_or(0.0),
                        result.tv_signal.to_label()
                    ),
                    TaskOutcome::Absent(reason) => {
                        absent.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("[{}/{}] {} absent: {}", done, total, symbol, reason);
                    }
                }
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!("Symbol task aborted: {}", e);
                    outcomes.push(TaskOutcome::Absent(AbsentReason::Failed("aborted")));
                }
            }
        }

        tracing::info!(
            "Enrichment done: {} symbols, {} absent",
            total,
            absent.load(Ordering::Relaxed)
        );
        outcomes
    }
}

/// Fetch, derive, gate and score one symbol. Every failure becomes an
/// `Absent` outcome.
pub async fn evaluate_symbol(
    providers: &Providers,
    config: &ScreenerConfig,
    engine: &MetricEngine,
    task: EnrichmentTask,
) -> TaskOutcome<ScoredResult> {
    let (snapshot, history) = match fetch_symbol_data(
        providers.symbol_data.as_ref(),
        &task.symbol,
        config.history_years,
        task.scan.as_ref(),
    )
    .await
    {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("{} fetch failed: {}", task.symbol, e);
            return TaskOutcome::Absent(AbsentReason::Failed(e.kind()));
        }
    };

    let mut form = task.scan.as_ref().map(|s| s.symbol.clone());
    let mut recommendation = if config.use_recommendations {
        task.scan.as_ref().and_then(|s| s.recommendation)
    } else {
        None
    };

    if recommendation.is_none() && config.use_recommendations {
        if let Some(provider) = &providers.recommendations {
            let plan = config.qualification_plan();
            if let Some((rec_form, rec)) = first_recommendation(provider.as_ref(), &plan, &task.symbol).await {
                recommendation = Some(rec.score);
                form.get_or_insert(rec_form);
            }
        }
    }

    score_symbol(
        engine,
        config,
        &task.symbol,
        form.as_ref(),
        &snapshot,
        &history,
        recommendation,
    )
}

/// Derive metrics, apply every gate and score. Pure: no I/O.
pub fn score_symbol(
    engine: &MetricEngine,
    config: &ScreenerConfig,
    symbol: &TickerSymbol,
    form: Option<&QualifiedSymbol>,
    snapshot: &FundamentalSnapshot,
    history: &SymbolHistory,
    recommendation: Option<f64>,
) -> TaskOutcome<ScoredResult> {
    let metrics = match engine.compute(MetricInputs {
        prices: &history.prices,
        snapshot,
        dividends: &history.dividends,
        recommendation,
    }) {
        Ok(metrics) => metrics,
        Err(e) => return TaskOutcome::Absent(AbsentReason::Failed(e.kind())),
    };

    if let Err(gate) = all_gates(snapshot, &metrics, config) {
        return TaskOutcome::Absent(AbsentReason::Filtered(gate));
    }

    let (score, score_model) = composite_score(&metrics);
    let trend = metrics.trend;

    TaskOutcome::Ready(ScoredResult {
        symbol: symbol.clone(),
        name: snapshot.name.clone(),
        exchange: form.map(|f| f.venue),
        sector: snapshot.sector.clone(),
        price: metrics.price,
        start_price: metrics.start_price,
        end_price: metrics.end_price,
        growth_5y_pct: metrics.growth_pct,
        slope: Some(trend.slope),
        intercept: Some(trend.intercept),
        r_value: Some(trend.r_value),
        r_squared: Some(trend.r_squared),
        p_value: Some(trend.p_value),
        std_err: Some(trend.std_err),
        observations: trend.observations,
        dividend_yield_pct: Some(metrics.dividends.yield_pct),
        annual_dividend: metrics.dividends.annual_dividend,
        last_dividend: metrics.dividends.last_payment,
        est_next_payment: Some(metrics.dividends.est_next_payment),
        ex_div_date: metrics.dividends.ex_div_date,
        beta: snapshot.beta,
        market_cap: snapshot.market_cap,
        tv_signal: metrics.signal,
        score: Some(score),
        score_model,
        venue_priority: form.map_or(0, |f| f.priority),
    })
}
