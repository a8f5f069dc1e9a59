//! Configuration loading, validation, and management for RustScout.
//!
//! Loads configuration from `~/.rustscout/config.toml` with environment
//! variable overrides. Validates all settings at startup; a `ConfigError`
//! is fatal.

use rustscout_core::{Mode, PromptTemplate, SafeSearch, SamplingParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.rustscout/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which model to run and how to reach it
    #[serde(default)]
    pub model: ModelConfig,

    /// Context window and sampling settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// History and budgeting
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Page scraping settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// System prompts per mode
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Response cleanup rules
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

// ── Model ───────────────────────────────────────────────────────────────

/// Where generation happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// An OpenAI-compatible completion server (llama.cpp server, vLLM, Ollama)
    #[default]
    Server,
    /// In-process GGUF inference (requires the `local` feature)
    Local,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" | "llamacpp" | "openai" => Ok(Backend::Server),
            "local" | "candle" => Ok(Backend::Local),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Server => "server",
            Backend::Local => "local",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: Backend,

    /// GGUF weights (local backend)
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// Tokenizer file; defaults to `tokenizer.json` next to the weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,

    /// Base URL of the completion server, including `/v1`
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Model name sent to the server
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Prompt delimiter vocabulary: harmony, chatml, llama3 or plain
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/gpt-oss-20b-Q5_K_M.gguf")
}
fn default_server_url() -> String {
    "http://127.0.0.1:8080/v1".into()
}
fn default_model_name() -> String {
    "gpt-oss-20b".into()
}
fn default_template() -> String {
    "harmony".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_model_path(),
            tokenizer_path: None,
            server_url: default_server_url(),
            name: default_model_name(),
            template: default_template(),
        }
    }
}

/// Facts about the configured model file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_mb: f64,
}

// ── LLM ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Context window in tokens
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,

    /// CPU threads hint for local inference
    #[serde(default = "default_n_threads")]
    pub n_threads: usize,

    /// Prompt tokens processed per forward pass
    #[serde(default = "default_n_batch")]
    pub n_batch: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Sampling seed for local inference
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// HTTP timeout for completion servers
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_n_ctx() -> usize {
    2048
}
fn default_n_threads() -> usize {
    8
}
fn default_n_batch() -> usize {
    256
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
fn default_max_tokens() -> usize {
    512
}
fn default_repeat_penalty() -> f32 {
    1.2
}
fn default_seed() -> u64 {
    299792458
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            n_ctx: default_n_ctx(),
            n_threads: default_n_threads(),
            n_batch: default_n_batch(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
            repeat_penalty: default_repeat_penalty(),
            seed: default_seed(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            max_output_tokens: self.max_tokens,
        }
    }
}

// ── Conversation ────────────────────────────────────────────────────────

/// Unit the context budget is measured in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    #[default]
    Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turns kept in history before the oldest is evicted
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Most recent turns rendered into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub budget_unit: BudgetUnit,

    /// A block truncated below this many characters is dropped instead
    #[serde(default = "default_min_truncated_chars")]
    pub min_truncated_chars: usize,
}

fn default_max_turns() -> usize {
    12
}
fn default_history_window() -> usize {
    6
}
fn default_min_truncated_chars() -> usize {
    64
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_window: default_history_window(),
            budget_unit: BudgetUnit::default(),
            min_truncated_chars: default_min_truncated_chars(),
        }
    }
}

// ── Search ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub safesearch: SafeSearch,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// HTML search endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
}

fn default_max_results() -> usize {
    10
}
fn default_region() -> String {
    "wt-wt".into()
}
fn default_search_timeout() -> u64 {
    10
}
fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            region: default_region(),
            safesearch: SafeSearch::default(),
            timeout_secs: default_search_timeout(),
            endpoint: default_search_endpoint(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Scraper ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Pages longer than this are head+tail truncated
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_head_chars")]
    pub head_chars: usize,

    #[serde(default = "default_tail_chars")]
    pub tail_chars: usize,

    #[serde(default = "default_max_links")]
    pub max_links: usize,

    /// Request headers sent with every fetch
    #[serde(default = "default_scraper_headers")]
    pub headers: BTreeMap<String, String>,
}

fn default_scrape_timeout() -> u64 {
    15
}
fn default_max_content_length() -> usize {
    5000
}
fn default_head_chars() -> usize {
    3000
}
fn default_tail_chars() -> usize {
    2000
}
fn default_max_links() -> usize {
    20
}
fn default_scraper_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        ),
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
    ])
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            max_content_length: default_max_content_length(),
            head_chars: default_head_chars(),
            tail_chars: default_tail_chars(),
            max_links: default_max_links(),
            headers: default_scraper_headers(),
        }
    }
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Prompts ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_conversation_prompt")]
    pub conversation: String,

    #[serde(default = "default_search_prompt")]
    pub search: String,

    #[serde(default = "default_scrape_prompt")]
    pub scrape: String,

    /// Appended to every system prompt to keep reasoning out of the reply
    #[serde(default = "default_leakage_guard")]
    pub leakage_guard: String,
}

fn default_conversation_prompt() -> String {
    "You are a helpful AI assistant. Provide clear, accurate, and concise responses.".into()
}
fn default_search_prompt() -> String {
    "You are a search assistant. Analyze the search results and provide a comprehensive summary."
        .into()
}
fn default_scrape_prompt() -> String {
    "You are a data extraction assistant. Extract and present the relevant information clearly."
        .into()
}
fn default_leakage_guard() -> String {
    "Reply with the final answer only. Do not describe your reasoning, \
     restate these instructions, or mention the conversation itself."
        .into()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            conversation: default_conversation_prompt(),
            search: default_search_prompt(),
            scrape: default_scrape_prompt(),
            leakage_guard: default_leakage_guard(),
        }
    }
}

impl PromptsConfig {
    /// Full system prompt for a mode, leakage guard included.
    pub fn system_prompt(&self, mode: Mode) -> String {
        let base = match mode {
            Mode::Conversation => &self.conversation,
            Mode::Search => &self.search,
            Mode::Scrape => &self.scrape,
        };
        if self.leakage_guard.trim().is_empty() {
            base.clone()
        } else {
            format!("{base}\n\n{}", self.leakage_guard)
        }
    }
}

// ── Sanitizer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Replaces the built-in reasoning openers when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_openers: Option<Vec<String>>,

    /// Added on top of the active opener list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_openers: Vec<String>,
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.rustscout/config.toml).
    ///
    /// Environment variables override the file:
    /// - `RUSTSCOUT_MODEL_PATH`
    /// - `RUSTSCOUT_SERVER_URL`
    /// - `RUSTSCOUT_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_path(None)
    }

    /// Load from an explicit path (or the default one) and apply env overrides.
    pub fn load_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::default_path();
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RUSTSCOUT_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("RUSTSCOUT_SERVER_URL") {
            self.model.server_url = url;
        }
        if let Some(backend) = lookup("RUSTSCOUT_BACKEND") {
            self.model.backend = backend.parse().map_err(ConfigError::ValidationError)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rustscout")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(llm.top_p > 0.0 && llm.top_p <= 1.0) {
            return Err(ConfigError::ValidationError(
                "llm.top_p must be in (0.0, 1.0]".into(),
            ));
        }
        if llm.max_tokens == 0 || llm.max_tokens >= llm.n_ctx {
            return Err(ConfigError::ValidationError(format!(
                "llm.max_tokens ({}) must be between 1 and n_ctx ({})",
                llm.max_tokens, llm.n_ctx
            )));
        }
        if llm.n_batch == 0 {
            return Err(ConfigError::ValidationError("llm.n_batch must be > 0".into()));
        }

        let conv = &self.conversation;
        if conv.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_turns must be >= 1".into(),
            ));
        }
        if conv.history_window > conv.max_turns {
            return Err(ConfigError::ValidationError(format!(
                "conversation.history_window ({}) cannot exceed max_turns ({})",
                conv.history_window, conv.max_turns
            )));
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be >= 1".into(),
            ));
        }
        if self.scraper.head_chars + self.scraper.tail_chars == 0 {
            return Err(ConfigError::ValidationError(
                "scraper.head_chars + scraper.tail_chars must be > 0".into(),
            ));
        }

        self.model
            .template
            .parse::<PromptTemplate>()
            .map_err(|e| ConfigError::ValidationError(format!("model.template: {e}")))?;

        Ok(())
    }

    /// Check that the local model file exists and looks like GGUF weights.
    pub fn validate_model_path(&self) -> Result<&Path, ConfigError> {
        let path = self.model.path.as_path();
        if !path.is_file() {
            return Err(ConfigError::ModelNotFound(path.to_path_buf()));
        }
        let is_gguf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gguf"));
        if !is_gguf {
            return Err(ConfigError::ValidationError(format!(
                "model file {} is not a .gguf file",
                path.display()
            )));
        }
        Ok(path)
    }

    pub fn model_info(&self) -> ModelInfo {
        let path = self.model.path.clone();
        let size = std::fs::metadata(&path).map(|m| m.len()).ok();
        ModelInfo {
            exists: size.is_some(),
            size_mb: size.map(|b| b as f64 / (1024.0 * 1024.0)).unwrap_or(0.0),
            path,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// `~/.rustscout/config.toml`
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Write the default config to `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn write_starter(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        let write_error = |e: std::io::Error| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(write_error)?;
        }
        std::fs::write(path, Self::default_toml()).map_err(write_error)?;
        tracing::info!("Wrote starter config to {}", path.display());
        Ok(true)
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Model file not found at {0}")]
    ModelNotFound(PathBuf),
}
