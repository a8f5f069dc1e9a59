//! Session-level streaming events.
//!
//! A streamed generation yields zero or more `chunk` events followed by
//! exactly one terminal event: `done` after the exchange was committed, or
//! `error` when nothing was.

use rustscout_core::GenerationError;
use serde::{Deserialize, Serialize};

/// Raw and cleaned text of one completed generation. Only `cleaned_text`
/// is stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub raw_text: String,
    pub cleaned_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Raw model text, relayed as soon as it arrives.
    Chunk { content: String },

    /// The exchange was sanitized and committed.
    Done { result: GenerationResult },

    /// The run failed; history is unchanged.
    Error { message: String },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    pub fn error(err: &GenerationError) -> Self {
        Self::Error {
            message: describe(err),
        }
    }
}

/// User-facing text for a generation failure.
pub fn describe(err: &GenerationError) -> String {
    match err {
        GenerationError::ModelNotLoaded | GenerationError::Busy => format!("Error: {err}"),
        other => format!("Error generating response: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = SessionEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = SessionEvent::Done {
            result: GenerationResult {
                raw_text: "<|end|>Hi".into(),
                cleaned_text: "Hi".into(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""cleaned_text":"Hi""#));
        assert!(event.is_terminal());
    }

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            describe(&GenerationError::ModelNotLoaded),
            "Error: Model not loaded. Please load the model first."
        );
        let event = SessionEvent::error(&GenerationError::Network("connection refused".into()));
        assert_eq!(event.event_type(), "error");
        assert_eq!(
            event,
            SessionEvent::Error {
                message: "Error generating response: Network error: connection refused".into()
            }
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, SessionEvent::Chunk { content: "hi".into() });
        assert!(!event.is_terminal());
    }
}
