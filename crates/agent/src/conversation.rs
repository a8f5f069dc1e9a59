//! Rolling conversation history.

use std::collections::VecDeque;
use std::sync::Arc;

use rustscout_core::{ConversationId, Mode, Turn};
use tokio::sync::Mutex;

pub const DEFAULT_MAX_TURNS: usize = 12;

/// Conversation state shared between a session and its owner.
pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// Ordered, capacity-bounded turn history for one conversation.
///
/// Appending past `max_turns` evicts the oldest turn. Only [`reset`]
/// clears it; switching mode does not.
///
/// [`reset`]: ConversationState::reset
#[derive(Debug, Clone)]
pub struct ConversationState {
    id: ConversationId,
    turns: VecDeque<Turn>,
    max_turns: usize,
    mode: Mode,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationState {
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            id: ConversationId::new(),
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
            mode: Mode::default(),
        }
    }

    pub fn shared(self) -> SharedConversation {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Append both turns of a completed exchange.
    pub fn commit_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.append(Turn::user(user));
        self.append(Turn::assistant(assistant));
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustscout_core::Role;

    #[test]
    fn keeps_latest_turns_in_order() {
        let mut state = ConversationState::new(12);
        for i in 0..7 {
            state.commit_exchange(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(state.len(), 12);

        let recent = state.recent(20);
        assert_eq!(recent.len(), 12);
        assert_eq!(recent[0].content(), "q1");
        assert_eq!(recent[0].role(), Role::User);
        assert_eq!(recent[11].content(), "a6");
    }

    #[test]
    fn recent_returns_tail() {
        let mut state = ConversationState::new(12);
        state.commit_exchange("q0", "a0");
        state.commit_exchange("q1", "a1");
        let contents: Vec<&str> = state.recent(3).iter().map(|t| t.content()).collect();
        assert_eq!(contents, vec!["a0", "q1", "a1"]);
        assert!(state.recent(0).is_empty());
    }

    #[test]
    fn mode_switch_keeps_history() {
        let mut state = ConversationState::default();
        state.commit_exchange("hello", "hi");
        state.set_mode(Mode::Search);
        assert_eq!(state.mode(), Mode::Search);
        assert_eq!(state.len(), 2);

        let id = state.id().clone();
        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.id(), &id);
        assert_eq!(state.mode(), Mode::Search);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut state = ConversationState::new(0);
        state.append(Turn::user("a"));
        state.append(Turn::user("b"));
        assert_eq!(state.turns().map(Turn::content).collect::<Vec<_>>(), vec!["b"]);
    }
}
