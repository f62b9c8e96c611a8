//! dividend-screener: rank steady dividend payers by trend quality and yield.
//!
//! Resolves a universe, scans it in bulk, enriches the survivors with
//! per-symbol history and fundamentals, and writes a ranked JSON artifact.
//!
//! Usage:
//!   cargo run -p dividend-screener
//!   cargo run -p dividend-screener -- --universe full --limit 600
//!   cargo run -p dividend-screener -- --symbols KO PEP JNJ --dry-run
//!   cargo run -p dividend-screener -- --output out/stocks.json --concurrency 16

use anyhow::Context;
use dividend_screener::{explicit_universe, write_output, Pipeline, Providers, UniverseResolver};
use market_data_client::{IndexMembershipSource, ListingDirectorySource, ScannerClient, YahooClient};
use screener_core::{BulkScanner, RecommendationProvider, ScreenerConfig, UniverseMode};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dividend_screener=info,market_data_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let mut config = ScreenerConfig::from_env().context("invalid SCREENER_* configuration")?;

    if let Some(mode) = arg_value(&args, "--universe") {
        config.universe_mode = mode
            .parse::<UniverseMode>()
            .with_context(|| format!("bad --universe value '{}'", mode))?;
    }
    if let Some(limit) = arg_value(&args, "--limit") {
        let limit: usize = limit
            .parse()
            .with_context(|| format!("bad --limit value '{}'", limit))?;
        config.max_symbols = (limit > 0).then_some(limit);
    }
    if let Some(path) = arg_value(&args, "--output") {
        config.output_path = path.to_string();
    }
    if args.iter().any(|a| a == "--no-scanner") {
        config.use_bulk_scanner = false;
    }
    if args.iter().any(|a| a == "--no-signals") {
        config.use_recommendations = false;
    }
    let concurrency: Option<usize> = arg_value(&args, "--concurrency")
        .map(|v| v.parse().with_context(|| format!("bad --concurrency value '{}'", v)))
        .transpose()?;
    config.validate()?;

    let universe = if let Some(idx) = args.iter().position(|a| a == "--symbols") {
        let raw: Vec<String> = args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .flat_map(|a| a.split(',').map(str::to_string).collect::<Vec<_>>())
            .collect();
        explicit_universe(&raw, config.max_symbols)
    } else {
        UniverseResolver::new(
            Arc::new(ListingDirectorySource::from_config(&config)),
            Arc::new(IndexMembershipSource::from_config(&config)),
            config.universe_mode,
            config.max_symbols,
        )
        .resolve()
        .await
    };

    tracing::info!(
        "dividend-screener: {} symbols, scanner={}, signals={} ({}), output={}, dry_run={}",
        universe.len(),
        config.use_bulk_scanner,
        config.use_recommendations,
        config.signal_interval,
        config.output_path,
        dry_run
    );

    let scanner = Arc::new(
        ScannerClient::from_config(&config).context("invalid SCREENER_SIGNAL_INTERVAL")?,
    );
    let providers = Providers {
        scanner: config
            .use_bulk_scanner
            .then(|| scanner.clone() as Arc<dyn BulkScanner>),
        symbol_data: Arc::new(YahooClient::from_config(&config)),
        recommendations: config
            .use_recommendations
            .then(|| scanner.clone() as Arc<dyn RecommendationProvider>),
    };

    let mut pipeline = Pipeline::new(config.clone(), providers);
    if let Some(workers) = concurrency {
        pipeline = pipeline.with_workers(workers);
    }

    let (output, summary) = pipeline.run(&universe).await;
    summary.log();

    for (rank, r) in output.data.iter().take(10).enumerate() {
        tracing::info!(
            "{:>2}. {:<6} score {:>6.2}  r2 {:.3}  yield {:.2}%  {}",
            rank + 1,
            r.symbol,
            r.score.unwrap_or(0.0),
            r.r_squared.unwrap_or(0.0),
            r.dividend_yield_pct.unwrap_or(0.0),
            r.tv_signal.to_label()
        );
    }

    if dry_run {
        tracing::info!("Dry run: {} results not written", output.data.len());
        return Ok(());
    }

    write_output(&output, Path::new(&config.output_path))
        .await
        .with_context(|| format!("failed to write {}", config.output_path))?;
    tracing::info!("Wrote {} results to {}", output.data.len(), config.output_path);
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  dividend-screener                         Resolve the universe from SCREENER_UNIVERSE");
    eprintln!("  dividend-screener --universe full|index   Pick the universe source");
    eprintln!("  dividend-screener --symbols KO PEP ...    Screen specific symbols");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --limit N          Cap the universe at N symbols (0 = no cap)");
    eprintln!("  --output PATH      Output file (default: stocks_data.json)");
    eprintln!("  --concurrency N    Fixed per-symbol worker count");
    eprintln!("  --no-scanner       Skip the bulk scan; enrich every symbol");
    eprintln!("  --no-signals       Skip technical recommendations");
    eprintln!("  --dry-run          Compute and log without writing the output");
}
