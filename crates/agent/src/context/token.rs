//! Size measures for prompt blocks.
//!
//! Token counts are estimated with a character heuristic: ~4 characters per
//! token, rounded up. Close enough for budgeting against a context window;
//! the real tokenizer lives behind the generator.

use rustscout_config::BudgetUnit;

const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_chars(text.chars().count())
}

pub fn tokens_for_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Size of `text` in `unit`.
pub fn measure(text: &str, unit: BudgetUnit) -> usize {
    match unit {
        BudgetUnit::Chars => text.chars().count(),
        BudgetUnit::Tokens => estimate_tokens(text),
    }
}

/// Largest character count whose measure in `unit` is at most `size`.
pub fn chars_within(size: usize, unit: BudgetUnit) -> usize {
    match unit {
        BudgetUnit::Chars => size,
        BudgetUnit::Tokens => size.saturating_mul(CHARS_PER_TOKEN),
    }
}

/// Convert a token count (context window, output reservation) into `unit`.
pub fn from_tokens(tokens: usize, unit: BudgetUnit) -> usize {
    match unit {
        BudgetUnit::Chars => tokens.saturating_mul(CHARS_PER_TOKEN),
        BudgetUnit::Tokens => tokens,
    }
}
