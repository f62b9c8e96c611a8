use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
///
/// Cloning shares the window, so every clone of a client draws from the same
/// budget.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Per-minute budget read from `var`, falling back to `default`.
    pub fn per_minute_from_env(var: &str, default: usize) -> Self {
        let limit = std::env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default);
        Self::new(limit, Duration::from_secs(60))
    }

    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait for the oldest request to leave the window.
            let oldest = match ts.front() {
                Some(&front) => front,
                None => continue,
            };
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for a request slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_budget_does_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(200));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
