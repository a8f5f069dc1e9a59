//! Completion-server generator.
//!
//! Talks to any server exposing an OpenAI-compatible `/v1/completions`
//! endpoint over a raw prompt: llama.cpp `llama-server`, vLLM, Ollama,
//! LM Studio. Prompt rendering happens on our side, so the server only
//! sees text.
//!
//! Supports:
//! - Non-streaming and streaming (SSE) completions
//! - Readiness probing via `/health` with a `/models` fallback

use async_trait::async_trait;
use futures::StreamExt;
use rustscout_core::error::GenerationError;
use rustscout_core::generator::{ChunkReceiver, GenerationChunk, GenerationRequest, Generator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// A generator backed by an OpenAI-compatible completion server.
pub struct CompletionServerGenerator {
    name: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl CompletionServerGenerator {
    /// Create a new generator.
    ///
    /// `base_url` includes the API prefix, e.g. `http://127.0.0.1:8080/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    /// Create a generator for a local llama.cpp server (convenience constructor).
    pub fn llama_server(base_url: Option<&str>) -> Result<Self, GenerationError> {
        Self::new(
            "llama-server",
            base_url.unwrap_or("http://127.0.0.1:8080/v1"),
            "default",
            Duration::from_secs(120),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Server root without the `/v1` API prefix (where `/health` lives).
    fn root_url(&self) -> &str {
        self.base_url
            .strip_suffix("/v1")
            .unwrap_or(&self.base_url)
    }

    fn request_body(&self, request: &GenerationRequest, stream: bool) -> CompletionBody {
        let s = &request.sampling;
        CompletionBody {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            max_tokens: s.max_output_tokens,
            temperature: s.temperature,
            top_p: s.top_p,
            top_k: s.top_k,
            repeat_penalty: s.repeat_penalty,
            stop: request.stop.clone(),
            stream,
        }
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/completions", self.base_url);
        let body = self.request_body(request, stream);

        debug!(
            generator = %self.name,
            model = %self.model,
            prompt_chars = request.prompt.len(),
            stream,
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.send().await.map_err(map_reqwest_err)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion server returned error");
            return Err(GenerationError::Backend {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else {
        GenerationError::Network(e.to_string())
    }
}

#[async_trait]
impl Generator for CompletionServerGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_ready(&self) -> bool {
        let health = format!("{}/health", self.root_url());
        match self.client.get(&health).send().await {
            Ok(resp) if resp.status().is_success() => return true,
            // 503 means the server is up but still loading weights.
            Ok(resp) if resp.status().as_u16() == 503 => {
                debug!(url = %health, "Server is loading the model");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(url = %health, error = %e, "Health check failed");
                return false;
            }
        }

        let models = format!("{}/models", self.base_url);
        self.client
            .get(&models)
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let response = self.send(&request, false).await?;

        let api_response: CompletionResponse =
            response.json().await.map_err(|e| GenerationError::Backend {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Backend {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(choice.text)
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ChunkReceiver, GenerationError> {
        let response = self.send(&request, true).await?;

        let (tx, rx) = mpsc::channel(64);
        let generator_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut finished = false;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GenerationError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for event in lines.push(&bytes) {
                    match event {
                        SseEvent::Done => {
                            let _ = tx.send(Ok(GenerationChunk::finished())).await;
                            return;
                        }
                        SseEvent::Data(data) => {
                            match serde_json::from_str::<CompletionResponse>(&data) {
                                Ok(resp) => {
                                    let Some(choice) = resp.choices.into_iter().next() else {
                                        continue;
                                    };
                                    if !choice.text.is_empty()
                                        && tx.send(Ok(GenerationChunk::delta(choice.text))).await.is_err()
                                    {
                                        return; // receiver dropped
                                    }
                                    if choice.finish_reason.is_some() {
                                        finished = true;
                                    }
                                }
                                Err(e) => {
                                    trace!(
                                        generator = %generator_name,
                                        data = %data,
                                        error = %e,
                                        "Ignoring unparseable SSE chunk"
                                    );
                                }
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let last = if finished {
                Ok(GenerationChunk::finished())
            } else {
                Err(GenerationError::StreamInterrupted(
                    "connection closed before the completion finished".into(),
                ))
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }
}

// ── SSE framing ─────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits an SSE byte stream into `data:` payloads. Bytes are buffered
/// until a full line arrives so multi-byte characters split across network
/// chunks decode correctly.
#[derive(Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !data.is_empty() {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
    top_k: usize,
    repeat_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rustscout_core::SamplingParams;

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "User: hi\nAssistant:",
            SamplingParams::default(),
            vec!["\nUser:".into()],
        )
    }

    fn generator(server: &mockito::Server) -> CompletionServerGenerator {
        CompletionServerGenerator::new(
            "test",
            format!("{}/v1", server.url()),
            "gpt-oss-20b",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn sse_lines_handle_split_chunks() {
        let mut lines = SseLines::default();
        assert!(lines.push(b"data: {\"choices\":[{\"te").is_empty());
        let events = lines.push(b"xt\":\"Hi\"}]}\n\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data(r#"{"choices":[{"text":"Hi"}]}"#.into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn sse_lines_keep_multibyte_chars_intact() {
        let mut lines = SseLines::default();
        let payload = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'
        let (a, b) = payload.split_at(8);
        assert!(lines.push(a).is_empty());
        assert_eq!(lines.push(b), vec![SseEvent::Data("héllo".into())]);
    }

    #[test]
    fn request_body_carries_sampling_and_stops() {
        let g = CompletionServerGenerator::llama_server(None).unwrap();
        let body = serde_json::to_value(g.request_body(&request(), true)).unwrap();
        assert_eq!(body["top_k"], 30);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stop"][0], "\nUser:");
    }

    #[test]
    fn root_url_strips_api_prefix() {
        let g = CompletionServerGenerator::llama_server(Some("http://gpu:8080/v1/")).unwrap();
        assert_eq!(g.base_url(), "http://gpu:8080/v1");
        assert_eq!(g.root_url(), "http://gpu:8080");
    }

    #[tokio::test]
    async fn generate_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({"stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"text":" Paris.","finish_reason":"stop"}]}"#)
            .create_async()
            .await;

        let text = generator(&server).generate(request()).await.unwrap();
        assert_eq!(text, " Paris.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_200_maps_to_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(500)
            .with_body("context overflow")
            .create_async()
            .await;

        let err = generator(&server).generate(request()).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Backend {
                status_code: 500,
                message: "context overflow".into()
            }
        );
    }

    #[tokio::test]
    async fn stream_relays_chunks_in_order() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"text\":\"The \"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"answer\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"\",\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        server
            .mock("POST", "/v1/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let mut rx = generator(&server).stream(request()).await.unwrap();
        let mut text = String::new();
        let mut done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            text.push_str(&chunk.text);
            done |= chunk.done;
        }
        assert_eq!(text, "The answer");
        assert!(done);
    }

    #[tokio::test]
    async fn stream_without_terminator_is_interrupted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_body("data: {\"choices\":[{\"text\":\"partial\"}]}\n\n")
            .create_async()
            .await;

        let mut rx = generator(&server).stream(request()).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.text, "partial");
        let last = rx.recv().await.unwrap();
        assert!(matches!(last, Err(GenerationError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn readiness_follows_health_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;
        assert!(generator(&server).is_ready().await);
    }

    #[tokio::test]
    async fn loading_server_is_not_ready() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;
        assert!(!generator(&server).is_ready().await);
    }

    #[tokio::test]
    async fn readiness_falls_back_to_models_listing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;
        assert!(generator(&server).is_ready().await);
    }
}
