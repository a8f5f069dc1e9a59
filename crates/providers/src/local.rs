//! Local inference generator: runs GGUF models directly on this machine.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML) to
//! run quantized models of the Llama family (Llama 2/3, Mistral, Qwen2,
//! TinyLlama, SmolLM). Mixture-of-experts models such as gpt-oss are not
//! covered by Candle's quantized Llama loader; serve those with
//! `llama-server` and use the `server` backend instead.
//!
//! Tokens are sampled on a blocking thread and pushed through a bounded
//! channel as they are decoded. Dropping the receiver stops generation at
//! the next token.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama as qlm;
use hf_hub::api::sync::Api;
use rustscout_config::AppConfig;
use rustscout_core::error::GenerationError;
use rustscout_core::generator::{
    ChunkReceiver, GenerationChunk, GenerationRequest, Generator, StopScanner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Tokens considered by the repeat penalty.
const REPEAT_LAST_N: usize = 64;

/// End-of-sequence spellings across the supported families.
const EOS_TOKENS: [&str; 6] = [
    "</s>",
    "<|endoftext|>",
    "<|im_end|>",
    "<|eot_id|>",
    "<|end|>",
    "<|return|>",
];

// ── Options ────────────────────────────────────────────────────────────

/// Load-time settings for a local model.
#[derive(Debug, Clone)]
pub struct LocalModelOptions {
    pub model_path: PathBuf,
    /// Explicit tokenizer file; otherwise `tokenizer.json` next to the weights
    pub tokenizer_path: Option<PathBuf>,
    /// HuggingFace repo to fetch `tokenizer.json` from when no file is found
    pub tokenizer_repo: Option<String>,
    pub n_ctx: usize,
    pub n_batch: usize,
    pub n_threads: usize,
    pub seed: u64,
}

impl LocalModelOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let name = &config.model.name;
        Self {
            model_path: config.model.path.clone(),
            tokenizer_path: config.model.tokenizer_path.clone(),
            tokenizer_repo: name.contains('/').then(|| name.clone()),
            n_ctx: config.llm.n_ctx,
            n_batch: config.llm.n_batch,
            n_threads: config.llm.n_threads,
            seed: config.llm.seed,
        }
    }
}

// ── Local Generator ────────────────────────────────────────────────────

/// A generator that runs a GGUF-quantized model locally via Candle.
///
/// The model is behind a Mutex because Candle inference on CPU is
/// single-threaded per model and keeps a KV cache.
pub struct LocalGenerator {
    inner: Arc<Mutex<Option<LocalModelState>>>,
    options: LocalModelOptions,
}

/// The loaded model state (tokenizer + weights).
struct LocalModelState {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_ids: Vec<u32>,
}

impl LocalGenerator {
    /// Create an unloaded generator. Call [`LocalGenerator::load`] before use;
    /// until then every request fails with `ModelNotLoaded`.
    pub fn new(options: LocalModelOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            options,
        }
    }

    /// Load weights and tokenizer into memory on a blocking thread.
    pub async fn load(&self) -> Result<(), GenerationError> {
        let options = self.options.clone();
        info!(
            path = %options.model_path.display(),
            n_ctx = options.n_ctx,
            n_threads = options.n_threads,
            n_batch = options.n_batch,
            "Loading local GGUF model"
        );

        let state = tokio::task::spawn_blocking(move || LocalModelState::load(&options))
            .await
            .map_err(|e| GenerationError::Inference(format!("Model loading task failed: {e}")))??;

        *self.inner.lock().await = Some(state);
        info!("Local model loaded successfully");
        Ok(())
    }

    /// Run one generation on a blocking thread, handing each emitted delta
    /// to `on_delta`. Returning `false` from the callback stops generation.
    async fn run<F>(&self, request: GenerationRequest, on_delta: F) -> Result<String, GenerationError>
    where
        F: FnMut(&str) -> bool + Send + 'static,
    {
        let inner = self.inner.clone();
        let n_ctx = self.options.n_ctx;
        let seed = self.options.seed;

        tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            let state = guard.as_mut().ok_or(GenerationError::ModelNotLoaded)?;
            state.generate(&request, n_ctx, seed, on_delta)
        })
        .await
        .map_err(|e| GenerationError::Inference(format!("Inference task panicked: {e}")))?
    }
}

impl LocalModelState {
    fn load(options: &LocalModelOptions) -> Result<Self, GenerationError> {
        let device = Device::Cpu;
        let path = options.model_path.as_path();

        let mut file = std::fs::File::open(path).map_err(|e| {
            GenerationError::Inference(format!("Failed to open model file {}: {e}", path.display()))
        })?;

        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| GenerationError::Inference(format!("Failed to parse GGUF file: {e}")))?;

        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device)
            .map_err(|e| GenerationError::Inference(format!("Failed to load model weights: {e}")))?;

        let tokenizer = load_tokenizer(options, path)?;

        let eos_token_ids: Vec<u32> = EOS_TOKENS
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if eos_token_ids.is_empty() {
            warn!("Tokenizer defines no known end-of-sequence token; relying on stop sequences");
        }
        debug!(eos = ?eos_token_ids, "Resolved end-of-sequence tokens");

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token_ids,
        })
    }

    /// Run inference: tokenize → sample tokens → decode incrementally.
    fn generate<F>(
        &mut self,
        request: &GenerationRequest,
        n_ctx: usize,
        seed: u64,
        mut on_delta: F,
    ) -> Result<String, GenerationError>
    where
        F: FnMut(&str) -> bool,
    {
        let sampling = &request.sampling;
        let encoding = self
            .tokenizer
            .encode(request.prompt.as_str(), true)
            .map_err(|e| GenerationError::Inference(format!("Tokenization failed: {e}")))?;

        let prompt_tokens = encoding.get_ids().to_vec();
        let prompt_len = prompt_tokens.len();
        if prompt_len == 0 {
            return Err(GenerationError::Inference("Prompt tokenized to nothing".into()));
        }
        if prompt_len >= n_ctx {
            return Err(GenerationError::Inference(format!(
                "Prompt is {prompt_len} tokens but the context window is {n_ctx}"
            )));
        }
        let max_new = sampling.max_output_tokens.min(n_ctx - prompt_len);

        debug!(
            prompt_tokens = prompt_len,
            max_new,
            temperature = sampling.temperature,
            top_k = sampling.top_k,
            top_p = sampling.top_p,
            "Starting local generation"
        );

        let mut logits_processor = if sampling.temperature <= 0.0 {
            LogitsProcessor::from_sampling(seed, Sampling::ArgMax)
        } else {
            LogitsProcessor::from_sampling(
                seed,
                Sampling::TopKThenTopP {
                    k: sampling.top_k.max(1),
                    p: f64::from(sampling.top_p),
                    temperature: f64::from(sampling.temperature),
                },
            )
        };

        let mut scanner = StopScanner::new(request.stop.clone());
        let mut all_tokens = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();
        let mut decoded_len = 0usize;
        let mut output = String::new();

        // index_pos 0 resets the KV cache from any previous request
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut logits = self
            .model
            .forward(&input, 0)
            .and_then(|l| l.squeeze(0))
            .map_err(map_candle_err)?;

        for index in 0..max_new {
            let logits_f32 = logits.to_dtype(DType::F32).map_err(map_candle_err)?;
            let logits_f32 = if (sampling.repeat_penalty - 1.0).abs() < f32::EPSILON {
                logits_f32
            } else {
                let start = all_tokens.len().saturating_sub(REPEAT_LAST_N);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits_f32,
                    sampling.repeat_penalty,
                    &all_tokens[start..],
                )
                .map_err(map_candle_err)?
            };

            let next_token = logits_processor
                .sample(&logits_f32)
                .map_err(map_candle_err)?;
            if self.eos_token_ids.contains(&next_token) {
                break;
            }
            all_tokens.push(next_token);
            generated.push(next_token);

            let text = self
                .tokenizer
                .decode(&generated, true)
                .map_err(|e| GenerationError::Inference(format!("Detokenization failed: {e}")))?;

            if text.len() > decoded_len && text.is_char_boundary(decoded_len) {
                let scan = scanner.push(&text[decoded_len..]);
                decoded_len = text.len();
                if !scan.emit.is_empty() {
                    output.push_str(&scan.emit);
                    if !on_delta(&scan.emit) {
                        debug!(tokens = generated.len(), "Receiver dropped, stopping generation");
                        return Ok(output);
                    }
                }
                if scan.stopped {
                    break;
                }
            }

            let input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
            logits = self
                .model
                .forward(&input, prompt_len + index)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;
        }

        let rest = scanner.finish();
        if !rest.is_empty() {
            output.push_str(&rest);
            on_delta(&rest);
        }

        debug!(
            completion_tokens = generated.len(),
            output_len = output.len(),
            "Generation complete"
        );
        Ok(output)
    }
}

fn load_tokenizer(options: &LocalModelOptions, model_path: &Path) -> Result<Tokenizer, GenerationError> {
    let local = options
        .tokenizer_path
        .clone()
        .unwrap_or_else(|| model_path.with_file_name("tokenizer.json"));

    let path = if local.exists() {
        local
    } else if let Some(repo) = &options.tokenizer_repo {
        warn!(repo = %repo, "No tokenizer.json found next to the model, downloading");
        let api = Api::new()
            .map_err(|e| GenerationError::Network(format!("HuggingFace Hub API error: {e}")))?;
        api.model(repo.clone())
            .get("tokenizer.json")
            .map_err(|e| GenerationError::Network(format!("Failed to download tokenizer from '{repo}': {e}")))?
    } else {
        return Err(GenerationError::Inference(format!(
            "Tokenizer not found at {}; set model.tokenizer_path or a model.name of the form org/repo",
            local.display()
        )));
    };

    Tokenizer::from_file(&path)
        .map_err(|e| GenerationError::Inference(format!("Failed to load tokenizer: {e}")))
}

/// Map Candle errors to GenerationError.
fn map_candle_err(e: candle_core::Error) -> GenerationError {
    GenerationError::Inference(format!("Candle inference error: {e}"))
}

// ── Generator trait implementation ─────────────────────────────────────

#[async_trait]
impl Generator for LocalGenerator {
    fn name(&self) -> &str {
        "local"
    }

    async fn is_ready(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.run(request, |_| true).await
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ChunkReceiver, GenerationError> {
        if !self.is_ready().await {
            return Err(GenerationError::ModelNotLoaded);
        }

        let (tx, rx) = mpsc::channel(64);
        let token_tx = tx.clone();
        let on_delta = move |delta: &str| {
            token_tx
                .blocking_send(Ok(GenerationChunk::delta(delta)))
                .is_ok()
        };

        let this = LocalGenerator {
            inner: self.inner.clone(),
            options: self.options.clone(),
        };
        tokio::spawn(async move {
            let last = match this.run(request, on_delta).await {
                Ok(_) => Ok(GenerationChunk::finished()),
                Err(e) => Err(e),
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(path: &str) -> LocalModelOptions {
        LocalModelOptions {
            model_path: PathBuf::from(path),
            tokenizer_path: None,
            tokenizer_repo: None,
            n_ctx: 2048,
            n_batch: 256,
            n_threads: 4,
            seed: 42,
        }
    }

    #[tokio::test]
    async fn unloaded_generator_is_not_ready() {
        let generator = LocalGenerator::new(options("/nonexistent/model.gguf"));
        assert!(!generator.is_ready().await);
        let req = GenerationRequest::new("hi", Default::default(), vec![]);
        assert_eq!(
            generator.generate(req.clone()).await.unwrap_err(),
            GenerationError::ModelNotLoaded
        );
        assert!(matches!(
            generator.stream(req).await,
            Err(GenerationError::ModelNotLoaded)
        ));
    }

    #[tokio::test]
    async fn missing_model_file_fails_to_load() {
        let generator = LocalGenerator::new(options("/nonexistent/model.gguf"));
        let err = generator.load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to open model file"));
        assert!(!generator.is_ready().await);
    }

    #[test]
    fn options_take_tokenizer_repo_from_model_name() {
        let mut config = AppConfig::default();
        config.model.name = "TinyLlama/TinyLlama-1.1B-Chat-v1.0".into();
        let opts = LocalModelOptions::from_config(&config);
        assert_eq!(
            opts.tokenizer_repo.as_deref(),
            Some("TinyLlama/TinyLlama-1.1B-Chat-v1.0")
        );
        assert_eq!(opts.n_ctx, 2048);

        config.model.name = "gpt-oss-20b".into();
        assert!(LocalModelOptions::from_config(&config).tokenizer_repo.is_none());
    }
}
