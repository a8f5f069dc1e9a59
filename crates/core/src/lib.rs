//! # RustScout Core
//!
//! Domain types, capability traits, and error definitions for the RustScout
//! assistant. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external capability (text generation, web search, page fetching) is
//! a trait defined here and passed explicitly to whoever needs it. There are
//! no process-wide singletons. This enables:
//! - Swapping backends via configuration
//! - Testing the orchestration with scripted fakes
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod generator;
pub mod message;
pub mod mode;
pub mod retrieval;
pub mod template;
pub mod truncate;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GenerationError, Result, RetrievalError};
pub use generator::{
    ChunkReceiver, GenerationChunk, GenerationRequest, Generator, SamplingParams, StopScan, StopScanner,
    truncate_at_stop,
};
pub use message::{ConversationId, Role, Turn};
pub use mode::Mode;
pub use retrieval::{
    FetchRequest, PageData, PageFetcher, PageLink, RetrievalSource, RetrievedContext, SafeSearch,
    SearchBackend, SearchHit, SearchRequest, failure_message,
};
pub use template::PromptTemplate;
pub use truncate::{HeadTail, Truncated, squeeze};
