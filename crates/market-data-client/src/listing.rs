//! Full-market universe from the exchange listing directory
//! (`nasdaqtraded.txt`, pipe-delimited, one row per traded security).

use async_trait::async_trait;
use reqwest::Client;
use screener_core::{normalize_symbols, ScreenerConfig, ScreenerError, TickerSymbol, UniverseSource, Venue};
use std::time::Duration;

use crate::{build_client, ensure_success, request_error};

const DEFAULT_LISTING_URL: &str = "https://www.nasdaqtrader.com/dynamic/SymDir/nasdaqtraded.txt";

pub struct ListingDirectorySource {
    client: Client,
    url: String,
    venues: Vec<Venue>,
}

impl ListingDirectorySource {
    /// `venues` limits rows to those listed on one of these exchanges; empty
    /// keeps every exchange.
    pub fn new(timeout: Duration, venues: Vec<Venue>) -> Self {
        Self {
            client: build_client(timeout),
            url: DEFAULT_LISTING_URL.to_string(),
            venues,
        }
    }

    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self::new(Duration::from_secs(config.request_timeout_secs), config.venues.clone())
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl UniverseSource for ListingDirectorySource {
    fn name(&self) -> &str {
        "listing-directory"
    }

    async fn fetch_symbols(&self) -> Result<Vec<TickerSymbol>, ScreenerError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| request_error("listing directory", e))?;
        let body = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(|e| request_error("listing directory", e))?;

        parse_listing(&body, &self.venues)
    }
}

fn listing_venue(code: &str) -> Option<Venue> {
    match code {
        "Q" => Some(Venue::Nasdaq),
        "N" => Some(Venue::Nyse),
        "A" => Some(Venue::Amex),
        _ => None,
    }
}

/// Parse the directory text into tradable common-share symbols.
///
/// Drops test issues, rows not currently traded, ETFs, the trailing
/// `File Creation Time` line and anything that does not normalize to a ticker.
pub fn parse_listing(text: &str, venues: &[Venue]) -> Result<Vec<TickerSymbol>, ScreenerError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ScreenerError::ParseError(format!("listing header: {}", e)))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let symbol_col = column("Symbol")
        .ok_or_else(|| ScreenerError::MissingField("listing column 'Symbol'".to_string()))?;
    let traded_col = column("Nasdaq Traded");
    let test_col = column("Test Issue");
    let etf_col = column("ETF");
    let exchange_col = column("Listing Exchange");

    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ScreenerError::ParseError(format!("listing row: {}", e)))?;
        if record.get(0).map_or(false, |f| f.starts_with("File Creation Time")) {
            continue;
        }
        let field = |col: Option<usize>| col.and_then(|i| record.get(i)).map(str::trim);

        let Some(symbol) = field(Some(symbol_col)).filter(|s| !s.is_empty()) else {
            continue;
        };
        if field(traded_col) == Some("N") || field(test_col) == Some("Y") || field(etf_col) == Some("Y") {
            continue;
        }
        if !venues.is_empty() {
            if let Some(code) = field(exchange_col) {
                match listing_venue(code) {
                    Some(venue) if venues.contains(&venue) => {}
                    _ => continue,
                }
            }
        }
        raw.push(symbol.to_string());
    }

    let symbols = normalize_symbols(raw);
    tracing::debug!("Listing directory: {} symbols after filtering", symbols.len());
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE: &str = "\
Nasdaq Traded|Symbol|Security Name|Listing Exchange|Market Category|ETF|Round Lot Size|Test Issue|Financial Status|CQS Symbol|NASDAQ Symbol|NextShares
Y|AAPL|Apple Inc. - Common Stock|Q|Q|N|100|N|N||AAPL|N
Y|BRK.B|Berkshire Hathaway Inc.|N| |N|100|N||BRK.B|BRK=B|N
Y|SPY|SPDR S&P 500 ETF Trust|P| |Y|100|N||SPY|SPY|N
Y|ZXZZT|NASDAQ TEST STOCK|Q|G|N|100|Y|N||ZXZZT|N
N|OLD|Delisted Corp|N| |N|100|N||OLD|OLD|N
Y|ABR$D|Arbor Realty Pfd D|N| |N|100|N||ABRpD|ABR$D|N
Y|ARCX|Arca Only Corp|P| |N|100|N||ARCX|ARCX|N
File Creation Time: 0110202522:01|||||||||||
";

    #[test]
    fn test_parse_listing_filters_rows() {
        let symbols = parse_listing(SAMPLE, &[Venue::Nasdaq, Venue::Nyse]).unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["AAPL", "BRK-B"]);
    }

    #[test]
    fn test_parse_listing_without_venue_filter() {
        let symbols = parse_listing(SAMPLE, &[]).unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["AAPL", "BRK-B", "ARCX"]);
    }

    #[test]
    fn test_missing_symbol_column() {
        let err = parse_listing("Foo|Bar\n1|2\n", &[]).unwrap_err();
        assert!(matches!(err, ScreenerError::MissingField(_)));
    }

    #[tokio::test]
    async fn test_fetch_symbols_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nasdaqtraded.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE))
            .mount(&server)
            .await;

        let source = ListingDirectorySource::new(Duration::from_secs(5), vec![Venue::Nasdaq])
            .with_url(format!("{}/nasdaqtraded.txt", server.uri()));
        let symbols = source.fetch_symbols().await.unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].as_str(), "AAPL");
    }
}
