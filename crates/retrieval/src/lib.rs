//! # RustScout Retrieval
//!
//! Fetches web context for the assistant: DuckDuckGo search hits and
//! scraped page text. Adapters turn either into a [`RetrievedContext`]
//! ready for prompt assembly.
//!
//! [`RetrievedContext`]: rustscout_core::RetrievedContext

pub mod duckduckgo;
pub mod extract;
pub mod fetch;
pub mod scrape;
pub mod search;

use std::sync::Arc;

use rustscout_config::AppConfig;
use rustscout_core::RetrievalError;

pub use duckduckgo::DuckDuckGoBackend;
pub use fetch::HttpPageFetcher;
pub use scrape::{DEFAULT_SCRAPE_PROMPT, ScrapeAdapter, ScrapeResult, normalize_url};
pub use search::SearchAdapter;

const FALLBACK_USER_AGENT: &str = concat!("rustscout/", env!("CARGO_PKG_VERSION"));

/// Search adapter backed by DuckDuckGo, configured from `config.search`.
///
/// The scraper's `User-Agent` header is reused for search requests.
pub fn search_adapter(config: &AppConfig) -> Result<SearchAdapter, RetrievalError> {
    let user_agent = config
        .scraper
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        .map(|(_, v)| v.as_str())
        .unwrap_or(FALLBACK_USER_AGENT);
    let backend = DuckDuckGoBackend::new(config.search.endpoint.clone(), user_agent)?;
    Ok(SearchAdapter::new(Arc::new(backend), &config.search))
}

/// Scrape adapter backed by the HTTP fetcher, configured from `config.scraper`.
pub fn scrape_adapter(config: &AppConfig) -> Result<ScrapeAdapter, RetrievalError> {
    let fetcher = HttpPageFetcher::new(config.scraper.max_links)?;
    Ok(ScrapeAdapter::new(Arc::new(fetcher), &config.scraper))
}
