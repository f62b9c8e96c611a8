//! Collapse per-symbol results into the single ranked artifact.

use chrono::{DateTime, Utc};
use screener_core::{RunMetadata, ScoredResult, ScreenerError, ScreenerOutput, TickerSymbol};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

/// Keep one result per base symbol: lowest venue priority, first seen on ties.
pub fn dedupe(results: Vec<ScoredResult>) -> Vec<ScoredResult> {
    let mut kept: Vec<ScoredResult> = Vec::with_capacity(results.len());
    let mut index: HashMap<TickerSymbol, usize> = HashMap::new();

    for result in results {
        match index.get(&result.symbol) {
            Some(&i) => {
                if result.venue_priority < kept[i].venue_priority {
                    kept[i] = result;
                }
            }
            None => {
                index.insert(result.symbol.clone(), kept.len());
                kept.push(result);
            }
        }
    }
    kept
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Drop non-finite values, then round what remains.
fn clean(value: Option<f64>, decimals: Option<i32>) -> Option<f64> {
    let value = value.filter(|v| v.is_finite())?;
    Some(match decimals {
        Some(d) => round_to(value, d),
        None => value,
    })
}

/// Replace every NaN or infinite metric with `None` and round for display.
pub fn sanitize(mut r: ScoredResult) -> ScoredResult {
    // prices
    r.price = clean(r.price, Some(2));
    r.start_price = clean(r.start_price, Some(2));
    r.end_price = clean(r.end_price, Some(2));
    r.growth_5y_pct = clean(r.growth_5y_pct, Some(2));
    // trend
    r.slope = clean(r.slope, Some(4));
    r.intercept = clean(r.intercept, Some(4));
    r.r_value = clean(r.r_value, Some(4));
    r.r_squared = clean(r.r_squared, Some(4));
    r.p_value = clean(r.p_value, None);
    r.std_err = clean(r.std_err, None);
    // dividends
    r.dividend_yield_pct = clean(r.dividend_yield_pct, Some(2));
    r.annual_dividend = clean(r.annual_dividend, Some(3));
    r.last_dividend = clean(r.last_dividend, Some(3));
    r.est_next_payment = clean(r.est_next_payment, Some(3));
    // risk, size, score
    r.beta = clean(r.beta, Some(2));
    r.market_cap = clean(r.market_cap, None);
    r.score = clean(r.score.map(|s| s.clamp(0.0, 100.0)), Some(2));
    r
}

/// Stable sort by score, descending. Absent and non-finite scores go last.
pub fn rank(results: &mut [ScoredResult]) {
    let key = |r: &ScoredResult| r.score.filter(|s| s.is_finite());
    results.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Dedupe and rank on full-precision scores, then sanitize for display and
/// wrap with run metadata.
pub fn build_output(results: Vec<ScoredResult>, total_analyzed: usize, completed_at: DateTime<Utc>) -> ScreenerOutput {
    let mut data = dedupe(results);
    rank(&mut data);
    let data: Vec<ScoredResult> = data.into_iter().map(sanitize).collect();

    ScreenerOutput {
        metadata: RunMetadata {
            last_updated: completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            total_analyzed,
        },
        data,
    }
}

/// Write the artifact as pretty JSON, replacing any previous file.
pub async fn write_output(output: &ScreenerOutput, path: &Path) -> Result<(), ScreenerError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ScreenerError::ParseError(format!("serialize output: {}", e)))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use screener_core::{ScoreModel, SignalClassification, Venue};

    fn result(symbol: &str, priority: usize, score: Option<f64>) -> ScoredResult {
        ScoredResult {
            symbol: TickerSymbol::parse(symbol).unwrap(),
            name: Some(format!("{} Corp", symbol)),
            exchange: Some(if priority == 0 { Venue::Nasdaq } else { Venue::Nyse }),
            sector: None,
            price: Some(101.234),
            start_price: Some(80.0),
            end_price: Some(101.234),
            growth_5y_pct: Some(26.5425),
            slope: Some(0.012345),
            intercept: Some(80.0),
            r_value: Some(0.95),
            r_squared: Some(0.9025),
            p_value: Some(1e-40),
            std_err: Some(0.0001),
            observations: 1250,
            dividend_yield_pct: Some(2.5),
            annual_dividend: Some(2.5309),
            last_dividend: Some(0.63),
            est_next_payment: Some(0.6327),
            ex_div_date: "2024-03-01".to_string(),
            beta: Some(0.8),
            market_cap: Some(5e10),
            tv_signal: SignalClassification::Unknown,
            score,
            score_model: ScoreModel::TrendYield,
            venue_priority: priority,
        }
    }

    fn symbols(results: &[ScoredResult]) -> Vec<String> {
        results.iter().map(|r| r.symbol.to_string()).collect()
    }

    #[test]
    fn test_dedupe_keeps_best_priority() {
        let out = dedupe(vec![
            result("KO", 1, Some(50.0)),
            result("PEP", 0, Some(40.0)),
            result("KO", 0, Some(10.0)),
            result("KO", 0, Some(99.0)),
        ]);
        assert_eq!(symbols(&out), vec!["KO", "PEP"]);
        assert_eq!(out[0].venue_priority, 0);
        assert_eq!(out[0].score, Some(10.0));
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let mut r = result("KO", 0, Some(f64::NAN));
        r.slope = Some(f64::INFINITY);
        r.p_value = Some(f64::NEG_INFINITY);
        let r = sanitize(r);

        assert_eq!(r.score, None);
        assert_eq!(r.slope, None);
        assert_eq!(r.p_value, None);
        assert_eq!(r.price, Some(101.23));
        assert_eq!(r.est_next_payment, Some(0.633));

        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"score\":null"));
        assert!(!json.contains("NaN"));
        assert!(!json.contains("venue_priority"));
    }

    #[test]
    fn test_rank_is_stable_and_puts_absent_last() {
        let mut results = vec![
            result("A", 0, Some(60.0)),
            result("B", 0, None),
            result("C", 0, Some(80.0)),
            result("D", 0, Some(60.0)),
            result("E", 0, Some(60.0)),
        ];
        rank(&mut results);
        assert_eq!(symbols(&results), vec!["C", "A", "D", "E", "B"]);
    }

    #[test]
    fn test_build_output_envelope() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 4, 5).unwrap();
        let output = build_output(
            vec![result("KO", 1, Some(70.0)), result("KO", 0, Some(71.0)), result("O", 0, Some(90.0))],
            42,
            at,
        );
        assert_eq!(output.metadata.last_updated, "2024-05-01 13:04:05");
        assert_eq!(output.metadata.total_analyzed, 42);
        assert_eq!(symbols(&output.data), vec!["O", "KO"]);
        assert_eq!(output.data[1].exchange, Some(Venue::Nasdaq));
    }

    #[test]
    fn test_ranking_uses_unrounded_scores() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let output = build_output(
            vec![
                result("AAA", 0, Some(77.5003)),
                result("BBB", 0, Some(77.5006)),
                result("CCC", 0, Some(f64::NAN)),
                result("DDD", 0, Some(10.0)),
            ],
            4,
            at,
        );
        assert_eq!(symbols(&output.data), vec!["BBB", "AAA", "DDD", "CCC"]);
        assert_eq!(output.data[0].score, Some(77.5));
        assert_eq!(output.data[1].score, Some(77.5));
        assert_eq!(output.data[3].score, None);
    }

    #[tokio::test]
    async fn test_write_output_overwrites() {
        let path = std::env::temp_dir().join(format!("screener-output-{}.json", std::process::id()));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        write_output(&build_output(vec![result("KO", 0, Some(1.0))], 1, at), &path)
            .await
            .unwrap();
        write_output(&build_output(vec![], 0, at), &path).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["metadata"]["total_analyzed"], 0);
        assert_eq!(written["data"].as_array().unwrap().len(), 0);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
