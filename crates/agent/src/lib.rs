//! Prompt and context orchestration for RustScout.
//!
//! A user turn flows through the pieces in this crate:
//!
//! 1. **Retrieve** (optional) search hits or a scraped page via the
//!    retrieval adapters
//! 2. **Budget** system prompt, recent history, context and user text
//!    against the model's context window
//! 3. **Assemble** the prompt with the model's role delimiters
//! 4. **Generate**, relaying chunks to the caller while buffering
//! 5. **Sanitize** the buffered reply and commit the exchange to history
//!
//! Nothing is committed when generation fails or the caller stops
//! listening.

pub mod assistant;
pub mod context;
pub mod conversation;
pub mod sanitizer;
pub mod session;
pub mod stream_event;

pub use assistant::Assistant;
pub use context::{
    BlockStats, BlockStatus, BudgetOutcome, BudgetViolation, ContextBlock, ContextBudgeter,
    PromptAssembler, PromptBudget, PromptTemplate,
};
pub use conversation::{ConversationState, SharedConversation};
pub use sanitizer::ResponseSanitizer;
pub use session::{GenerationSession, SessionPhase, SessionSettings, UserTurn};
pub use stream_event::{GenerationResult, SessionEvent};
