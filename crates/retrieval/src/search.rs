//! Search adapter: query in, formatted hit list out.

use std::sync::Arc;
use std::time::Duration;

use rustscout_config::SearchConfig;
use rustscout_core::{
    RetrievalError, RetrievalSource, RetrievedContext, SafeSearch, SearchBackend, SearchHit,
    SearchRequest,
};
use tracing::{info, warn};

pub struct SearchAdapter {
    backend: Arc<dyn SearchBackend>,
    region: String,
    safesearch: SafeSearch,
    max_results: usize,
    timeout: Duration,
}

impl SearchAdapter {
    pub fn new(backend: Arc<dyn SearchBackend>, config: &SearchConfig) -> Self {
        Self {
            backend,
            region: config.region.clone(),
            safesearch: config.safesearch,
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }

    /// Run a search. Hits come back in backend rank order, at most
    /// `max_results` (the configured limit when `None`).
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        let limit = max_results.unwrap_or(self.max_results).max(1);

        info!(backend = self.backend.name(), query, limit, "Searching");
        let request = SearchRequest {
            query: query.to_string(),
            region: self.region.clone(),
            safesearch: self.safesearch,
            max_results: limit,
            timeout: self.timeout,
        };

        let mut hits = tokio::time::timeout(self.timeout, self.backend.search(&request))
            .await
            .map_err(|_| RetrievalError::SearchTimeout {
                secs: self.timeout.as_secs(),
            })?
            .inspect_err(|e| warn!(query, error = %e, "Search failed"))?;

        if hits.is_empty() {
            return Err(RetrievalError::NoResults);
        }
        hits.truncate(limit);
        Ok(hits)
    }

    /// Render hits as numbered blocks.
    pub fn format(hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return "No results to format".to_string();
        }

        let mut out = Vec::with_capacity(hits.len() * 5);
        for (idx, hit) in hits.iter().enumerate() {
            out.push(format!("**Result {}:**", idx + 1));
            out.push(format!("Title: {}", or_placeholder(&hit.title, "No title")));
            out.push(format!("URL: {}", or_placeholder(&hit.url, "No URL")));
            out.push(format!(
                "Description: {}",
                or_placeholder(&hit.snippet, "No description")
            ));
            out.push(String::new());
        }
        out.join("\n")
    }

    /// Search and package the hits as retrieved context.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrievalError> {
        let hits = self.search(query, None).await?;
        let results = Self::format(&hits);
        let formatted = format!("Search Query: {}\n\nSearch Results:\n{results}", query.trim());
        Ok(RetrievedContext::new(RetrievalSource::Search, results, formatted))
    }

    /// The user-turn text for a search.
    pub fn prompt_for(query: &str) -> String {
        format!(
            "Please analyze these search results for the query: '{}'",
            query.trim()
        )
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() { placeholder } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        hits: Vec<SearchHit>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn with_hits(n: usize) -> Self {
            Self {
                hits: (1..=n)
                    .map(|i| SearchHit {
                        title: format!("Title {i}"),
                        url: format!("https://example.com/{i}"),
                        snippet: format!("Snippet {i}"),
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl SearchBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn empty_query_never_reaches_backend() {
        let backend = Arc::new(FakeBackend::with_hits(3));
        let adapter = SearchAdapter::new(backend.clone(), &SearchConfig::default());
        let err = adapter.search("   ", None).await.unwrap_err();
        assert_eq!(err, RetrievalError::EmptyQuery);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_hits_is_a_failure() {
        let adapter = SearchAdapter::new(
            Arc::new(FakeBackend::with_hits(0)),
            &SearchConfig::default(),
        );
        assert_eq!(
            adapter.search("rust", None).await.unwrap_err(),
            RetrievalError::NoResults
        );
    }

    #[tokio::test]
    async fn results_are_limited_in_rank_order() {
        let adapter = SearchAdapter::new(
            Arc::new(FakeBackend::with_hits(15)),
            &SearchConfig::default(),
        );
        let hits = adapter.search("rust", None).await.unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].title, "Title 1");

        let few = adapter.search("rust", Some(3)).await.unwrap();
        assert_eq!(few.len(), 3);
        assert_eq!(few[2].url, "https://example.com/3");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_times_out() {
        let adapter = SearchAdapter::new(Arc::new(HangingBackend), &SearchConfig::default());
        assert_eq!(
            adapter.search("rust", None).await.unwrap_err(),
            RetrievalError::SearchTimeout { secs: 10 }
        );
    }

    #[test]
    fn format_numbers_results() {
        let hits = vec![
            SearchHit {
                title: "Rust".into(),
                url: "https://rust-lang.org".into(),
                snippet: "A language".into(),
            },
            SearchHit {
                title: String::new(),
                url: "https://crates.io".into(),
                snippet: String::new(),
            },
        ];
        assert_eq!(
            SearchAdapter::format(&hits),
            "**Result 1:**\nTitle: Rust\nURL: https://rust-lang.org\nDescription: A language\n\n\
             **Result 2:**\nTitle: No title\nURL: https://crates.io\nDescription: No description\n"
        );
        assert_eq!(SearchAdapter::format(&[]), "No results to format");
    }

    #[tokio::test]
    async fn retrieve_wraps_results_with_query() {
        let adapter = SearchAdapter::new(
            Arc::new(FakeBackend::with_hits(1)),
            &SearchConfig::default(),
        );
        let ctx = adapter.retrieve(" rust async ").await.unwrap();
        assert_eq!(ctx.source, RetrievalSource::Search);
        assert!(ctx.formatted.starts_with("Search Query: rust async\n\nSearch Results:\n**Result 1:**"));
        assert_eq!(
            SearchAdapter::prompt_for("rust async"),
            "Please analyze these search results for the query: 'rust async'"
        );
    }
}
