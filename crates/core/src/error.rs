//! Error types for the RustScout domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all RustScout operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the text generation capability, surfaced in-band by the
/// generation session. None of them mutate conversation history.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("Model not loaded. Please load the model first.")]
    ModelNotLoaded,

    #[error("A generation is already in progress for this conversation")]
    Busy,

    #[error("Backend request failed: {message} (status: {status_code})")]
    Backend { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model produced no visible output")]
    EmptyResponse,
}

/// Failures of the search and scrape capabilities. The adapters turn these
/// into a formatted failure message instead of propagating them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    #[error("Search query cannot be empty")]
    EmptyQuery,

    #[error("No results found")]
    NoResults,

    #[error("URL cannot be empty")]
    EmptyUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout: Page took too long to load ({secs}s)")]
    PageTimeout { secs: u64 },

    #[error("Timeout: search took longer than {secs}s")]
    SearchTimeout { secs: u64 },

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Request error: {0}")]
    Request(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
