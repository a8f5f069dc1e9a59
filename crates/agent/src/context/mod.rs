//! Prompt construction: size budgeting and template rendering.
//!
//! | Block | Source | Shrink strategy |
//! |-------|--------|-----------------|
//! | system | mode prompt + leakage guard | pinned |
//! | history | recent turns | dropped oldest first |
//! | context | search results / scraped page | head+tail truncated |
//! | user | current turn | pinned |

pub mod budget;
pub mod template;
pub mod token;

pub use budget::{
    BlockStats, BlockStatus, BudgetOutcome, BudgetViolation, ContextBlock, ContextBudgeter,
    PromptBudget,
};
pub use template::{PromptAssembler, PromptTemplate};
