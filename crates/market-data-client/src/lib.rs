//! HTTP adapters for the remote sources the screener reads from.

pub mod index_page;
pub mod listing;
pub mod rate_limiter;
pub mod scanner;
pub mod yahoo;

pub use index_page::IndexMembershipSource;
pub use listing::ListingDirectorySource;
pub use rate_limiter::RateLimiter;
pub use scanner::ScannerClient;
pub use yahoo::YahooClient;

use reqwest::Client;
use screener_core::ScreenerError;
use std::time::Duration;

/// Browser-like agent. Several of the public endpoints reject the default one.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Shared client with the per-request timeout applied.
pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a transport error, keeping timeouts distinguishable from other failures.
pub(crate) fn request_error(context: &str, err: reqwest::Error) -> ScreenerError {
    if err.is_timeout() {
        ScreenerError::Timeout(format!("{}: {}", context, err))
    } else {
        ScreenerError::ApiError(format!("{}: {}", context, err))
    }
}

/// Turn a non-success response into an `ApiError` carrying status and body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ScreenerError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ScreenerError::ApiError(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(200).collect::<String>()
    )))
}
