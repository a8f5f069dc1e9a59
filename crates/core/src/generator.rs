//! Generator trait, the abstraction over text generation backends.
//!
//! A Generator takes a fully rendered prompt plus sampling parameters and
//! produces text, either as one blob or as a stream of chunks. It knows
//! nothing about conversations, modes, or retrieval.
//!
//! Implementations: OpenAI-compatible completion servers, local GGUF inference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GenerationError;

/// Sampling knobs sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    0.8
}
fn default_top_k() -> usize {
    30
}
fn default_repeat_penalty() -> f32 {
    1.2
}
fn default_max_output_tokens() -> usize {
    512
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repeat_penalty: default_repeat_penalty(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// One generation call. Built fresh per call and moved into the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully assembled prompt, ending with an open assistant tag
    pub prompt: String,

    pub sampling: SamplingParams,

    /// Stop sequences, in priority order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, sampling: SamplingParams, stop: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sampling,
            stop,
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    /// Text delta (may be empty on the final chunk)
    #[serde(default)]
    pub text: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl GenerationChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    pub fn finished() -> Self {
        Self {
            text: String::new(),
            done: true,
        }
    }
}

/// Receiving half of a generation stream. Dropping it cancels generation.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<GenerationChunk, GenerationError>>;

/// The core Generator trait.
///
/// The generation session calls `generate()` or `stream()` without knowing
/// which backend is in use.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name (e.g., "llama-server", "local").
    fn name(&self) -> &str;

    /// Whether a model is loaded and able to serve requests.
    async fn is_ready(&self) -> bool {
        true
    }

    /// Generate the full completion for a request.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<String, GenerationError>;

    /// Generate a completion as a stream of chunks.
    ///
    /// Default implementation calls `generate()` and wraps the result as a
    /// single final chunk.
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<ChunkReceiver, GenerationError> {
        let text = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(Ok(GenerationChunk::delta(text))).await;
        let _ = tx.send(Ok(GenerationChunk::finished())).await;
        Ok(rx)
    }
}

/// Cut `text` at the earliest occurrence of any stop sequence.
///
/// Returns `true` when a stop sequence was found.
pub fn truncate_at_stop(text: &mut String, stop: &[String]) -> bool {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min();
    match cut {
        Some(idx) => {
            text.truncate(idx);
            true
        }
        None => false,
    }
}

/// Incremental stop-sequence detection for token streams.
///
/// Text that could still turn into a stop sequence is held back until the
/// next delta settles it, so a stop marker is never partially emitted.
#[derive(Debug, Clone, Default)]
pub struct StopScanner {
    stops: Vec<String>,
    pending: String,
    stopped: bool,
}

/// Output of one [`StopScanner::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopScan {
    /// Text that is safe to emit now
    pub emit: String,
    /// A stop sequence was hit; nothing further will be emitted
    pub stopped: bool,
}

impl StopScanner {
    pub fn new(stops: Vec<String>) -> Self {
        Self {
            stops: stops.into_iter().filter(|s| !s.is_empty()).collect(),
            pending: String::new(),
            stopped: false,
        }
    }

    pub fn push(&mut self, delta: &str) -> StopScan {
        if self.stopped {
            return StopScan {
                emit: String::new(),
                stopped: true,
            };
        }
        self.pending.push_str(delta);

        if truncate_at_stop(&mut self.pending, &self.stops) {
            self.stopped = true;
            return StopScan {
                emit: std::mem::take(&mut self.pending),
                stopped: true,
            };
        }

        let cut = self.pending.len() - self.partial_suffix_len();
        let emit: String = self.pending.drain(..cut).collect();
        StopScan {
            emit,
            stopped: false,
        }
    }

    /// Flush held-back text once the stream ends without a stop.
    pub fn finish(&mut self) -> String {
        if self.stopped {
            String::new()
        } else {
            std::mem::take(&mut self.pending)
        }
    }

    /// Length of the longest suffix of `pending` that begins a stop sequence.
    fn partial_suffix_len(&self) -> usize {
        self.stops
            .iter()
            .filter_map(|stop| {
                (1..stop.len()).rev().find(|&k| {
                    stop.is_char_boundary(k) && self.pending.ends_with(&stop[..k])
                })
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_holds_back_partial_stop() {
        let mut scanner = StopScanner::new(vec!["<|end|>".into()]);
        let a = scanner.push("Hello <|e");
        assert_eq!(a.emit, "Hello ");
        assert!(!a.stopped);
        let b = scanner.push("nd|> ignored");
        assert_eq!(b.emit, "");
        assert!(b.stopped);
        assert_eq!(scanner.push("more").emit, "");
        assert_eq!(scanner.finish(), "");
    }

    #[test]
    fn scanner_releases_false_alarm() {
        let mut scanner = StopScanner::new(vec!["\nUser:".into()]);
        assert_eq!(scanner.push("line one\n").emit, "line one");
        assert_eq!(scanner.push("Use this").emit, "\nUse this");
        assert_eq!(scanner.push("\nUs").emit, "");
        assert_eq!(scanner.finish(), "\nUs");
    }

    #[test]
    fn sampling_defaults() {
        let s = SamplingParams::default();
        assert!((s.temperature - 0.2).abs() < f32::EPSILON);
        assert!((s.top_p - 0.8).abs() < f32::EPSILON);
        assert_eq!(s.top_k, 30);
        assert_eq!(s.max_output_tokens, 512);
    }

    #[test]
    fn sampling_deserializes_partial() {
        let s: SamplingParams = serde_json::from_str(r#"{"temperature": 0.7}"#).unwrap();
        assert!((s.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(s.top_k, 30);
    }

    #[test]
    fn stop_truncation_uses_earliest_match() {
        let mut text = "Paris.\nUser: next<|end|>".to_string();
        let hit = truncate_at_stop(&mut text, &["<|end|>".into(), "\nUser:".into()]);
        assert!(hit);
        assert_eq!(text, "Paris.");

        let mut clean = "no stops here".to_string();
        assert!(!truncate_at_stop(&mut clean, &["<|end|>".into()]));
        assert_eq!(clean, "no stops here");
    }

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> std::result::Result<String, GenerationError> {
            Ok(request.prompt)
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_generate() {
        let req = GenerationRequest::new("hello", SamplingParams::default(), vec![]);
        let mut rx = Echo.stream(req).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.text, "hello");
        assert!(!first.done);
        let last = rx.recv().await.unwrap().unwrap();
        assert!(last.done);
        assert!(rx.recv().await.is_none());
    }
}
