//! Prompt templates: the role delimiters a model was trained on.
//!
//! The template name is configuration; parsing it here keeps the accepted
//! names and aliases in one place.

use std::fmt;
use std::str::FromStr;

use crate::message::Role;

/// Closed set of supported prompt formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    /// gpt-oss "harmony" format
    #[default]
    Harmony,
    ChatMl,
    Llama3,
    /// Bare `User:` / `Assistant:` transcript
    Plain,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 4] = [Self::Harmony, Self::ChatMl, Self::Llama3, Self::Plain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harmony => "harmony",
            Self::ChatMl => "chatml",
            Self::Llama3 => "llama3",
            Self::Plain => "plain",
        }
    }

    /// System block wrapping `text`.
    pub fn system(&self, text: &str) -> String {
        match self {
            Self::Harmony => format!("<|start|>system<|message|>{text}<|end|>"),
            Self::ChatMl => format!("<|im_start|>system\n{text}<|im_end|>\n"),
            Self::Llama3 => {
                format!("<|start_header_id|>system<|end_header_id|>\n\n{text}<|eot_id|>")
            }
            Self::Plain => format!("{text}\n\n"),
        }
    }

    /// One history or user turn.
    pub fn turn(&self, role: Role, text: &str) -> String {
        match (self, role) {
            (Self::Harmony, Role::User) => format!("<|start|>user<|message|>{text}<|end|>"),
            (Self::Harmony, Role::Assistant) => {
                format!("<|start|>assistant<|channel|>final<|message|>{text}<|end|>")
            }
            (Self::ChatMl, role) => format!("<|im_start|>{}\n{text}<|im_end|>\n", role.as_str()),
            (Self::Llama3, role) => format!(
                "<|start_header_id|>{}<|end_header_id|>\n\n{text}<|eot_id|>",
                role.as_str()
            ),
            (Self::Plain, Role::User) => format!("User: {text}\n"),
            (Self::Plain, Role::Assistant) => format!("Assistant: {text}\n"),
        }
    }

    /// Open assistant tag the model continues from.
    pub fn open_assistant(&self) -> &'static str {
        match self {
            Self::Harmony => "<|start|>assistant",
            Self::ChatMl => "<|im_start|>assistant\n",
            Self::Llama3 => "<|start_header_id|>assistant<|end_header_id|>\n\n",
            Self::Plain => "Assistant:",
        }
    }

    /// Sequences that end an assistant turn, in match order.
    pub fn stop_sequences(&self) -> Vec<String> {
        let stops: &[&str] = match self {
            Self::Harmony => &["<|return|>", "<|call|>", "<|start|>user"],
            Self::ChatMl => &["<|im_end|>", "<|im_start|>"],
            Self::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
            Self::Plain => &["User:", "\nUser:", "\n\n\n", "<|end|>"],
        };
        stops.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "harmony" | "gpt-oss" => Ok(Self::Harmony),
            "chatml" => Ok(Self::ChatMl),
            "llama3" | "llama-3" => Ok(Self::Llama3),
            "plain" => Ok(Self::Plain),
            other => Err(format!("unknown prompt template '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_parse_to_canonical_names() {
        assert_eq!("gpt-oss".parse::<PromptTemplate>().unwrap(), PromptTemplate::Harmony);
        assert_eq!(" Llama-3 ".parse::<PromptTemplate>().unwrap(), PromptTemplate::Llama3);
        assert_eq!("chatml".parse::<PromptTemplate>().unwrap().to_string(), "chatml");
        assert!("alpaca".parse::<PromptTemplate>().is_err());
    }
}
