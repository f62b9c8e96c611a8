//! Ordinary least squares of closing price against a zero-based day index.

use screener_core::{ScreenerError, TrendStatistics};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Fit `close = intercept + slope * day` over `closes`.
///
/// Fails with `InsufficientData` when fewer than `min_observations` closes are
/// supplied (never fewer than 3, the minimum for a residual degree of freedom).
pub fn fit_trend(closes: &[f64], min_observations: usize) -> Result<TrendStatistics, ScreenerError> {
    let n = closes.len();
    let required = min_observations.max(3);
    if n < required {
        return Err(ScreenerError::InsufficientData(format!(
            "{} observations, need {}",
            n, required
        )));
    }
    if closes.iter().any(|c| !c.is_finite()) {
        return Err(ScreenerError::InvalidData("non-finite close in series".to_string()));
    }

    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = closes.iter().sum::<f64>() / nf;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (i, y) in closes.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }

    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;

    // Flat series: no trend, no correlation.
    if ss_yy < 1e-15 {
        return Ok(TrendStatistics {
            slope: 0.0,
            intercept: y_mean,
            r_value: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
            std_err: 0.0,
            observations: n,
        });
    }

    let r_value = (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0);
    let r_squared = r_value * r_value;

    let df = nf - 2.0;
    let ss_res = (ss_yy - slope * ss_xy).max(0.0);
    let std_err = (ss_res / df / ss_xx).sqrt();

    let p_value = if std_err < 1e-15 {
        0.0
    } else {
        let t = slope / std_err;
        let dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| ScreenerError::InvalidData(format!("t distribution: {}", e)))?;
        (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0)
    };

    Ok(TrendStatistics {
        slope,
        intercept,
        r_value,
        r_squared,
        p_value,
        std_err,
        observations: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(count: usize, start: f64, end: f64) -> Vec<f64> {
        let step = (end - start) / (count as f64 - 1.0);
        (0..count).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_perfect_line() {
        let closes = linear(260, 100.0, 150.0);
        let stats = fit_trend(&closes, 200).unwrap();

        assert!((stats.slope - 50.0 / 259.0).abs() < 1e-9);
        assert!((stats.intercept - 100.0).abs() < 1e-6);
        assert!((stats.r_squared - 1.0).abs() < 1e-9);
        assert!(stats.p_value < 1e-10);
        assert!(stats.std_err < 1e-6);
        assert_eq!(stats.observations, 260);
    }

    #[test]
    fn test_insufficient_history_rejected() {
        let closes = linear(199, 100.0, 150.0);
        let err = fit_trend(&closes, 200).unwrap_err();
        assert!(matches!(err, ScreenerError::InsufficientData(_)));
    }

    #[test]
    fn test_flat_series() {
        let closes = vec![42.0; 250];
        let stats = fit_trend(&closes, 200).unwrap();
        assert_eq!(stats.slope, 0.0);
        assert_eq!(stats.r_squared, 0.0);
        assert_eq!(stats.p_value, 1.0);
    }

    #[test]
    fn test_downtrend_negative_slope() {
        let closes = linear(220, 80.0, 40.0);
        let stats = fit_trend(&closes, 200).unwrap();
        assert!(stats.slope < 0.0);
        assert!(stats.r_value < -0.99);
        assert!(stats.r_squared > 0.99);
    }

    #[test]
    fn test_noisy_trend_statistics() {
        // Deterministic zig-zag around an uptrend.
        let closes: Vec<f64> = (0..300)
            .map(|i| 50.0 + 0.1 * i as f64 + if i % 2 == 0 { 3.0 } else { -3.0 })
            .collect();
        let stats = fit_trend(&closes, 200).unwrap();

        assert!((stats.slope - 0.1).abs() < 0.01);
        assert!(stats.r_squared > 0.5 && stats.r_squared < 1.0);
        assert!(stats.std_err > 0.0);
        assert!(stats.p_value < 0.001);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut closes = linear(210, 1.0, 2.0);
        closes[5] = f64::NAN;
        assert!(matches!(fit_trend(&closes, 200), Err(ScreenerError::InvalidData(_))));
    }
}
