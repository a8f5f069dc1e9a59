//! Prompt assembly on top of the model's [`PromptTemplate`].

use rustscout_config::BudgetUnit;
pub use rustscout_core::PromptTemplate;
use rustscout_core::{Role, Turn};

use crate::context::token;

/// Renders the final prompt text for one generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> PromptTemplate {
        self.template
    }

    /// System block, each history turn tagged by role, the current user
    /// turn, then an open assistant tag with nothing after it.
    pub fn assemble(&self, system: &str, history: &[&Turn], user_text: &str) -> String {
        let mut prompt = String::new();
        if !system.is_empty() {
            prompt.push_str(&self.template.system(system));
        }
        for turn in history {
            prompt.push_str(&self.template.turn(turn.role(), turn.content()));
        }
        prompt.push_str(&self.template.turn(Role::User, user_text));
        prompt.push_str(self.template.open_assistant());
        prompt
    }

    pub fn stop_sequences(&self) -> Vec<String> {
        self.template.stop_sequences()
    }

    /// Size of the delimiters alone for a prompt with `history_turns` turns
    /// of history, measured in `unit`.
    pub fn overhead(&self, history_turns: usize, unit: BudgetUnit) -> usize {
        let t = self.template;
        let per_turn = t
            .turn(Role::User, "")
            .chars()
            .count()
            .max(t.turn(Role::Assistant, "").chars().count());
        let chars = t.system("").chars().count()
            + per_turn * (history_turns + 1)
            + t.open_assistant().chars().count();
        match unit {
            BudgetUnit::Chars => chars,
            BudgetUnit::Tokens => token::tokens_for_chars(chars),
        }
    }
}
