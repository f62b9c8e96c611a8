use screener_core::SignalClassification;

/// Classify an optional recommendation score. A missing source is `Unknown`,
/// which callers must keep distinct from `Neutral`.
pub fn classify(score: Option<f64>) -> SignalClassification {
    score
        .map(SignalClassification::from_score)
        .unwrap_or(SignalClassification::Unknown)
}
