//! The assistant facade: mode dispatch, retrieval, then a streamed session.

use std::sync::Arc;

use rustscout_config::AppConfig;
use rustscout_core::{Error, GenerationError, Generator, Mode, RetrievalSource, failure_message};
use rustscout_retrieval::{ScrapeAdapter, SearchAdapter};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::conversation::ConversationState;
use crate::session::{GenerationSession, UserTurn};
use crate::stream_event::{GenerationResult, SessionEvent};

/// One conversation with its generator and retrieval tools.
pub struct Assistant {
    session: GenerationSession,
    search: SearchAdapter,
    scrape: ScrapeAdapter,
}

impl Assistant {
    pub fn new(session: GenerationSession, search: SearchAdapter, scrape: ScrapeAdapter) -> Self {
        Self {
            session,
            search,
            scrape,
        }
    }

    /// Wire a fresh conversation, the DuckDuckGo search adapter and the
    /// HTTP scrape adapter from configuration.
    pub fn from_config(generator: Arc<dyn Generator>, config: &AppConfig) -> Result<Self, Error> {
        let conversation = ConversationState::new(config.conversation.max_turns).shared();
        let session = GenerationSession::from_config(generator, conversation, config).map_err(
            |e| Error::Config {
                message: e.to_string(),
            },
        )?;
        Ok(Self::new(
            session,
            rustscout_retrieval::search_adapter(config)?,
            rustscout_retrieval::scrape_adapter(config)?,
        ))
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), GenerationError> {
        let mut state = self
            .session
            .conversation()
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        self.session.switch_mode(&mut state, mode);
        info!(conversation_id = %state.id(), mode = %mode, "Mode switched");
        Ok(())
    }

    /// Clear history. The mode is kept.
    pub fn reset(&self) -> Result<(), GenerationError> {
        let mut state = self
            .session
            .conversation()
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        state.reset();
        info!(conversation_id = %state.id(), "Conversation reset");
        Ok(())
    }

    /// Plain chat turn.
    pub async fn converse(&self, text: &str) -> ReceiverStream<SessionEvent> {
        self.session
            .run_stream(UserTurn::new(text).in_mode(Mode::Conversation))
            .await
    }

    /// Non-streaming chat turn.
    pub async fn ask(&self, text: &str) -> Result<GenerationResult, GenerationError> {
        self.session
            .run(UserTurn::new(text).in_mode(Mode::Conversation))
            .await
    }

    /// Search the web and answer from the hits. A failed search is reported
    /// as the only event and the generator is never called.
    pub async fn search(&self, query: &str) -> ReceiverStream<SessionEvent> {
        match self.search.retrieve(query).await {
            Ok(context) => {
                let turn = UserTurn::new(SearchAdapter::prompt_for(query))
                    .with_context(context)
                    .in_mode(Mode::Search);
                self.session.run_stream(turn).await
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                failure_stream(failure_message(RetrievalSource::Search, &e))
            }
        }
    }

    /// Scrape a page and answer `question` about it (a summary by default).
    pub async fn scrape(&self, url: &str, question: Option<&str>) -> ReceiverStream<SessionEvent> {
        match self.scrape.retrieve(url).await {
            Ok(context) => {
                let turn = UserTurn::new(ScrapeAdapter::prompt_for(question))
                    .with_context(context)
                    .in_mode(Mode::Scrape);
                self.session.run_stream(turn).await
            }
            Err(e) => {
                warn!(url, error = %e, "Scrape failed");
                failure_stream(failure_message(RetrievalSource::Scrape, &e))
            }
        }
    }

    /// Handle raw input in the current mode. In scrape mode the first word
    /// is the URL and the rest is the question.
    pub async fn submit(&self, input: &str) -> ReceiverStream<SessionEvent> {
        match self.mode() {
            Mode::Conversation => self.converse(input).await,
            Mode::Search => self.search(input).await,
            Mode::Scrape => {
                let (url, question) = split_url(input);
                self.scrape(url, question).await
            }
        }
    }
}

/// Split `"<url> [question]"`.
pub fn split_url(input: &str) -> (&str, Option<&str>) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((url, rest)) if !rest.trim().is_empty() => (url, Some(rest.trim())),
        Some((url, _)) => (url, None),
        None => (input, None),
    }
}

fn failure_stream(message: String) -> ReceiverStream<SessionEvent> {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(SessionEvent::Error { message });
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rustscout_config::{ScraperConfig, SearchConfig};
    use rustscout_core::{
        FetchRequest, GenerationRequest, PageData, PageFetcher, RetrievalError, SearchBackend,
        SearchHit, SearchRequest,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("An answer.".into())
        }
    }

    struct OneHit;

    #[async_trait]
    impl SearchBackend for OneHit {
        fn name(&self) -> &str {
            "one-hit"
        }

        async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
            Ok(vec![SearchHit {
                title: "Rust".into(),
                url: "https://rust-lang.org".into(),
                snippet: "A language".into(),
            }])
        }
    }

    struct NotFound;

    #[async_trait]
    impl PageFetcher for NotFound {
        fn name(&self) -> &str {
            "not-found"
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<PageData, RetrievalError> {
            Err(RetrievalError::Http { status: 404 })
        }
    }

    fn assistant(generator: Arc<CountingGenerator>) -> Assistant {
        let config = AppConfig::default();
        let session = GenerationSession::from_config(
            generator,
            ConversationState::new(12).shared(),
            &config,
        )
        .unwrap();
        Assistant::new(
            session,
            SearchAdapter::new(Arc::new(OneHit), &SearchConfig::default()),
            ScrapeAdapter::new(Arc::new(NotFound), &ScraperConfig::default()),
        )
    }

    fn counting() -> Arc<CountingGenerator> {
        Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn empty_query_never_reaches_generator() {
        let generator = counting();
        let assistant = assistant(generator.clone());

        let events: Vec<SessionEvent> = assistant.search("  ").await.collect().await;
        assert_eq!(
            events,
            vec![SessionEvent::Error {
                message: "Search failed: Search query cannot be empty".into()
            }]
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scrape_failure_is_formatted() {
        let generator = counting();
        let assistant = assistant(generator.clone());

        let events: Vec<SessionEvent> = assistant
            .scrape("example.com", Some("what is it?"))
            .await
            .collect()
            .await;
        assert_eq!(
            events,
            vec![SessionEvent::Error {
                message: "Scraping failed: HTTP error: status 404".into()
            }]
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_commits_prompt_not_results() {
        let generator = counting();
        let assistant = assistant(generator.clone());

        let events: Vec<SessionEvent> = assistant.search("rust").await.collect().await;
        assert!(matches!(events.last(), Some(SessionEvent::Done { .. })));

        let state = assistant.session().conversation().lock().await;
        let first = state.turns().next().unwrap();
        assert_eq!(
            first.content(),
            "Please analyze these search results for the query: 'rust'"
        );
        assert_eq!(state.mode(), Mode::Search);
    }

    #[tokio::test]
    async fn submit_follows_current_mode() {
        let generator = counting();
        let assistant = assistant(generator.clone());

        assistant.set_mode(Mode::Scrape).unwrap();
        let events: Vec<SessionEvent> = assistant.submit("example.com").await.collect().await;
        assert!(matches!(&events[0], SessionEvent::Error { message } if message.starts_with("Scraping failed")));

        assistant.set_mode(Mode::Conversation).unwrap();
        let events: Vec<SessionEvent> = assistant.submit("hello").await.collect().await;
        assert!(matches!(events.last(), Some(SessionEvent::Done { .. })));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        assistant.reset().unwrap();
        assert!(assistant.session().conversation().lock().await.is_empty());
    }

    #[test]
    fn split_url_separates_question() {
        assert_eq!(split_url("example.com"), ("example.com", None));
        assert_eq!(
            split_url(" example.com  who wrote this? "),
            ("example.com", Some("who wrote this?"))
        );
    }
}
