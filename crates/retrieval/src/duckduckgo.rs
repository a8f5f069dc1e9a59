//! DuckDuckGo search backend, reading the JavaScript-free HTML endpoint.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rustscout_core::{RetrievalError, SafeSearch, SearchBackend, SearchHit, SearchRequest};
use tracing::debug;
use url::Url;

use crate::extract::{inline_text, parse_attrs};

pub const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b([^>]*\bclass\s*=\s*["'][^"']*\bresult__a\b[^"']*["'][^>]*)>(.*?)</a\s*>"#)
        .expect("valid regex")
});

static RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:a|div|td|span)\b[^>]*\bclass\s*=\s*["'][^"']*\bresult__snippet\b[^"']*["'][^>]*>(.*?)</(?:a|div|td|span)\s*>"#,
    )
    .expect("valid regex")
});

pub struct DuckDuckGoBackend {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl DuckDuckGoBackend {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RetrievalError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
        })
    }

    fn search_url(&self, request: &SearchRequest) -> Result<Url, RetrievalError> {
        let kp = match request.safesearch {
            SafeSearch::Strict => "1",
            SafeSearch::Moderate => "-1",
            SafeSearch::Off => "-2",
        };
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", request.query.as_str()),
                ("kl", request.region.as_str()),
                ("kp", kp),
            ],
        )
        .map_err(|e| RetrievalError::InvalidUrl(format!("{}: {e}", self.endpoint)))
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        let url = self.search_url(request)?;
        debug!(url = %url, "Querying DuckDuckGo");

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::SearchTimeout {
                        secs: request.timeout.as_secs(),
                    }
                } else {
                    RetrievalError::Request(e.to_string())
                }
            })?;

        // DuckDuckGo answers rate-limited clients with 202 and a challenge page
        let status = response.status().as_u16();
        if status != 200 {
            return Err(RetrievalError::Http { status });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RetrievalError::Request(format!("Failed to read response body: {e}")))?;

        let mut hits = parse_results(&body);
        hits.truncate(request.max_results);
        Ok(hits)
    }
}

/// Parse the result list of a DuckDuckGo HTML page. Ads are skipped.
pub fn parse_results(html: &str) -> Vec<SearchHit> {
    let links: Vec<_> = RESULT_LINK.captures_iter(html).collect();
    let mut hits = Vec::with_capacity(links.len());

    for (i, caps) in links.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let attrs = parse_attrs(&caps[1]);
        let Some(url) = attrs.get("href").and_then(|h| unwrap_redirect(h)) else {
            continue;
        };
        if is_ad(&url) {
            continue;
        }

        let block_end = links
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let snippet = RESULT_SNIPPET
            .captures(&html[whole.end()..block_end])
            .map(|s| inline_text(&s[1]))
            .unwrap_or_default();

        hits.push(SearchHit {
            title: inline_text(&caps[2]),
            url,
            snippet,
        });
    }

    hits
}

/// Resolve `//duckduckgo.com/l/?uddg=<target>` redirect links to their target.
fn unwrap_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");
    if is_redirect {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

fn is_ad(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| {
        u.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) && u.path().starts_with("/y.js")
    })
}
