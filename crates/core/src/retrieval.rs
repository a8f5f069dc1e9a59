//! Retrieval capabilities: web search and single-page fetching.
//!
//! Backends return raw structured data. Validation, formatting and the
//! failure-message contract live in the adapters (`rustscout-retrieval`).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// One search hit, in backend rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Safe-search level understood by search backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Strict,
    #[default]
    Moderate,
    Off,
}

impl std::str::FromStr for SafeSearch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "on" => Ok(SafeSearch::Strict),
            "moderate" => Ok(SafeSearch::Moderate),
            "off" => Ok(SafeSearch::Off),
            other => Err(format!("unknown safesearch level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub region: String,
    pub safesearch: SafeSearch,
    pub max_results: usize,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Extra request headers (User-Agent, Accept, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A hyperlink found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub url: String,
}

/// Structured content of one fetched page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    /// Final URL the content was read from
    pub url: String,
    pub title: String,
    /// Main readable text, one block per line
    pub text: String,
    #[serde(default)]
    pub links: Vec<PageLink>,
    /// Selected `<meta>` values (description, og_title, og_description)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Search capability.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Return hits in rank order. An empty vector means "no results".
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError>;
}

/// Scrape capability.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, request: &FetchRequest) -> Result<PageData, RetrievalError>;
}

/// Where a piece of retrieved context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Search,
    Scrape,
}

impl RetrievalSource {
    /// Prefix used when a retrieval fails, e.g. `Search failed: ...`.
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            RetrievalSource::Search => "Search failed",
            RetrievalSource::Scrape => "Scraping failed",
        }
    }
}

/// Retrieved material for a single generation. Merged into the user's turn
/// for that one prompt and never stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub source: RetrievalSource,
    /// Unformatted payload (hit list or page text rendered plainly)
    pub raw: String,
    /// Text that goes into the prompt
    pub formatted: String,
}

impl RetrievedContext {
    pub fn new(source: RetrievalSource, raw: impl Into<String>, formatted: impl Into<String>) -> Self {
        Self {
            source,
            raw: raw.into(),
            formatted: formatted.into(),
        }
    }
}

/// Render a retrieval failure the way it is shown to the user.
pub fn failure_message(source: RetrievalSource, error: &RetrievalError) -> String {
    format!("{}: {}", source.failure_prefix(), error)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
