//! Index-membership universe scraped from the constituents table of a public
//! index page (S&P 500 by default).

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use screener_core::{normalize_symbols, ScreenerConfig, ScreenerError, TickerSymbol, UniverseSource};
use std::time::Duration;

use crate::{build_client, ensure_success, request_error};

const DEFAULT_INDEX_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

pub struct IndexMembershipSource {
    client: Client,
    url: String,
}

impl IndexMembershipSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            url: DEFAULT_INDEX_URL.to_string(),
        }
    }

    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self::new(Duration::from_secs(config.request_timeout_secs))
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl UniverseSource for IndexMembershipSource {
    fn name(&self) -> &str {
        "index-membership"
    }

    async fn fetch_symbols(&self) -> Result<Vec<TickerSymbol>, ScreenerError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| request_error("index page", e))?;
        let html = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(|e| request_error("index page", e))?;

        parse_constituents(&html)
    }
}

fn selector(css: &str) -> Result<Selector, ScreenerError> {
    Selector::parse(css).map_err(|e| ScreenerError::ParseError(format!("selector '{}': {:?}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Symbols from the first table on the page, read from its `Symbol` column.
pub fn parse_constituents(html: &str) -> Result<Vec<TickerSymbol>, ScreenerError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let header_sel = selector("th")?;
    let cell_sel = selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| ScreenerError::MissingField("constituents table".to_string()))?;

    let mut symbol_col = None;
    let mut raw = Vec::new();
    for row in table.select(&row_sel) {
        if symbol_col.is_none() {
            symbol_col = row
                .select(&header_sel)
                .position(|th| cell_text(th).eq_ignore_ascii_case("symbol"));
            continue;
        }
        let Some(col) = symbol_col else { continue };
        if let Some(cell) = row.select(&cell_sel).nth(col) {
            raw.push(cell_text(cell));
        }
    }

    if symbol_col.is_none() {
        return Err(ScreenerError::MissingField("constituents 'Symbol' column".to_string()));
    }

    let symbols = normalize_symbols(raw);
    tracing::debug!("Index page: {} constituents", symbols.len());
    Ok(symbols)
}
