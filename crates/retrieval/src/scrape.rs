//! Scrape adapter: URL in, formatted page context out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rustscout_config::ScraperConfig;
use rustscout_core::truncate::HeadTail;
use rustscout_core::{
    FetchRequest, PageFetcher, PageLink, RetrievalError, RetrievalSource, RetrievedContext,
};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

/// Links listed in the formatted context.
const LISTED_LINKS: usize = 10;

/// Question used when the user gives none.
pub const DEFAULT_SCRAPE_PROMPT: &str = "Please summarize the key information from this web page.";

/// A scraped page after truncation and link capping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeResult {
    pub url: String,
    pub title: String,
    /// Page text, head+tail truncated when long
    pub content: String,
    pub links: Vec<PageLink>,
    pub metadata: BTreeMap<String, String>,
    pub truncated: bool,
    /// Character count of the page text before truncation
    pub original_len: usize,
}

pub struct ScrapeAdapter {
    fetcher: Arc<dyn PageFetcher>,
    policy: HeadTail,
    max_links: usize,
    timeout: Duration,
    headers: BTreeMap<String, String>,
}

impl ScrapeAdapter {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScraperConfig) -> Self {
        Self {
            fetcher,
            policy: HeadTail::new(
                config.max_content_length,
                config.head_chars,
                config.tail_chars,
            ),
            max_links: config.max_links,
            timeout: config.timeout(),
            headers: config.headers.clone(),
        }
    }

    /// Fetch one page. Each call is bounded by the configured timeout and
    /// never retried.
    pub async fn scrape(&self, raw_url: &str) -> Result<ScrapeResult, RetrievalError> {
        let url = normalize_url(raw_url)?;
        info!(url = %url, "Scraping page");

        let request = FetchRequest {
            url: url.clone(),
            timeout: self.timeout,
            headers: self.headers.clone(),
        };
        let page = tokio::time::timeout(self.timeout, self.fetcher.fetch(&request))
            .await
            .map_err(|_| RetrievalError::PageTimeout {
                secs: self.timeout.as_secs(),
            })?
            .inspect_err(|e| warn!(url = %url, error = %e, "Scrape failed"))?;

        let truncated = self.policy.apply(&page.text);
        let mut links = page.links;
        links.truncate(self.max_links);

        Ok(ScrapeResult {
            url: if page.url.is_empty() { url } else { page.url },
            title: page.title,
            content: truncated.text,
            links,
            metadata: page.metadata,
            truncated: truncated.truncated,
            original_len: truncated.original_len,
        })
    }

    /// Render a scrape result as prompt context.
    pub fn format(result: &ScrapeResult) -> String {
        let mut out = vec![
            format!("**URL:** {}", result.url),
            format!("**Title:** {}", result.title),
            String::new(),
        ];

        if !result.metadata.is_empty() {
            out.push("**Metadata:**".into());
            for (key, value) in &result.metadata {
                out.push(format!("  - {key}: {value}"));
            }
            out.push(String::new());
        }

        if !result.content.is_empty() {
            out.push("**Content:**".into());
            out.push(result.content.clone());
            out.push(String::new());
        }

        if !result.links.is_empty() {
            out.push(format!("**Links Found ({}):**", result.links.len()));
            for link in result.links.iter().take(LISTED_LINKS) {
                let text = if link.text.is_empty() { "No text" } else { &link.text };
                out.push(format!("  - {text}: {}", link.url));
            }
        }

        out.join("\n")
    }

    /// Scrape and package the page as retrieved context.
    pub async fn retrieve(&self, raw_url: &str) -> Result<RetrievedContext, RetrievalError> {
        let result = self.scrape(raw_url).await?;
        Ok(RetrievedContext::new(
            RetrievalSource::Scrape,
            result.content.clone(),
            Self::format(&result),
        ))
    }

    /// The user-turn text for a scrape: the question, or a summary request.
    pub fn prompt_for(question: Option<&str>) -> String {
        match question.map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => DEFAULT_SCRAPE_PROMPT.to_string(),
        }
    }
}

/// Trim, default the scheme to `https://`, and check the result parses as
/// an http(s) URL with a host.
pub fn normalize_url(raw: &str) -> Result<String, RetrievalError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RetrievalError::EmptyUrl);
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        Url::parse(&candidate).map_err(|e| RetrievalError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none_or(str::is_empty) {
        return Err(RetrievalError::InvalidUrl(trimmed.to_string()));
    }

    // Keep the user's spelling (no trailing slash added by the parser)
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rustscout_core::PageData;

    struct FakeFetcher {
        text: String,
        links: usize,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<PageData, RetrievalError> {
            Ok(PageData {
                url: request.url.clone(),
                title: "Fake Page".into(),
                text: self.text.clone(),
                links: (0..self.links)
                    .map(|i| PageLink {
                        text: format!("link {i}"),
                        url: format!("https://example.com/{i}"),
                    })
                    .collect(),
                metadata: BTreeMap::from([("description".to_string(), "fake".to_string())]),
            })
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<PageData, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(PageData::default())
        }
    }

    fn adapter(fetcher: impl PageFetcher + 'static) -> ScrapeAdapter {
        ScrapeAdapter::new(Arc::new(fetcher), &ScraperConfig::default())
    }

    #[test]
    fn bare_domain_gets_https() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(
            normalize_url("  http://example.com/a?b=1 ").unwrap(),
            "http://example.com/a?b=1"
        );
    }

    #[test]
    fn empty_and_invalid_urls_rejected() {
        assert_eq!(normalize_url("   ").unwrap_err(), RetrievalError::EmptyUrl);
        assert!(matches!(
            normalize_url("http://"),
            Err(RetrievalError::InvalidUrl(_))
        ));
        assert!(matches!(
            normalize_url("exa mple.com"),
            Err(RetrievalError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn long_pages_keep_head_and_tail() {
        let text: String = (0..8000).map(|i| if i % 2 == 0 { 'a' } else { 'b' }).collect();
        let result = adapter(FakeFetcher {
            text: text.clone(),
            links: 0,
        })
        .scrape("example.com")
        .await
        .unwrap();

        assert!(result.truncated);
        assert_eq!(result.original_len, 8000);
        assert!(result.content.starts_with(&text[..3000]));
        assert!(result.content.ends_with(&text[6000..]));
        assert!(result.content.contains("showing first 3000 and last 2000 chars"));
        assert_eq!(result.url, "https://example.com");
    }

    #[tokio::test]
    async fn links_are_capped() {
        let result = adapter(FakeFetcher {
            text: "short".into(),
            links: 35,
        })
        .scrape("https://example.com")
        .await
        .unwrap();
        assert_eq!(result.links.len(), 20);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn empty_url_fails_before_fetching() {
        let err = adapter(SlowFetcher).scrape("").await.unwrap_err();
        assert_eq!(err, RetrievalError::EmptyUrl);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let err = adapter(SlowFetcher).scrape("example.com").await.unwrap_err();
        assert_eq!(err, RetrievalError::PageTimeout { secs: 15 });
    }

    #[tokio::test]
    async fn format_lists_first_ten_links() {
        let result = adapter(FakeFetcher {
            text: "Body".into(),
            links: 12,
        })
        .scrape("example.com")
        .await
        .unwrap();
        let formatted = ScrapeAdapter::format(&result);

        assert!(formatted.starts_with("**URL:** https://example.com\n**Title:** Fake Page\n"));
        assert!(formatted.contains("**Metadata:**\n  - description: fake\n"));
        assert!(formatted.contains("**Content:**\nBody\n"));
        assert!(formatted.contains("**Links Found (12):**"));
        assert!(formatted.contains("  - link 9: https://example.com/9"));
        assert!(!formatted.contains("link 10"));
    }

    #[test]
    fn prompt_defaults_to_summary() {
        assert_eq!(ScrapeAdapter::prompt_for(None), DEFAULT_SCRAPE_PROMPT);
        assert_eq!(ScrapeAdapter::prompt_for(Some("  ")), DEFAULT_SCRAPE_PROMPT);
        assert_eq!(ScrapeAdapter::prompt_for(Some("Who wrote it?")), "Who wrote it?");
    }
}
