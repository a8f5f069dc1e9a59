//! Interaction modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the assistant is doing with the current turn. Selects the system
/// prompt; switching modes never clears history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain chat
    #[default]
    Conversation,
    /// Answer from web search results
    Search,
    /// Answer from a scraped web page
    Scrape,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Conversation, Mode::Search, Mode::Scrape];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Conversation => "conversation",
            Mode::Search => "search",
            Mode::Scrape => "scrape",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" | "chat" => Ok(Mode::Conversation),
            "search" | "web" => Ok(Mode::Search),
            "scrape" | "page" => Ok(Mode::Scrape),
            other => Err(format!(
                "unknown mode '{other}' (expected conversation, search or scrape)"
            )),
        }
    }
}
