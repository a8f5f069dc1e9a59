pub mod ask;
pub mod chat;
pub mod scrape;
pub mod search;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, bail};
use rustscout_agent::{Assistant, GenerationResult, SessionEvent};
use rustscout_config::{AppConfig, Backend};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// Load the config, writing a starter file first when none exists.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = config_path.map_or_else(AppConfig::default_path, Path::to_path_buf);
    if AppConfig::write_starter(&path)? {
        eprintln!("  Wrote a starter config to {}", path.display());
    }
    AppConfig::load_path(Some(&path)).context("Failed to load config")
}

/// Build the generator, check it is ready, then wire the assistant.
pub async fn build_assistant(config: &AppConfig) -> anyhow::Result<Assistant> {
    let generator = rustscout_providers::build_from_config(config)
        .await
        .context("Failed to initialize the model backend")?;
    if !generator.is_ready().await {
        eprintln!();
        eprintln!("  ERROR: Model not loaded!");
        eprintln!();
        for line in model_status(config) {
            eprintln!("  {line}");
        }
        eprintln!();
        eprintln!("  Start llama-server with the model, or set backend = \"local\" in");
        eprintln!("    {}", AppConfig::default_path().display());
        eprintln!();
        bail!("{} is not ready", generator.name());
    }

    Ok(Assistant::from_config(generator, config)?)
}

/// Backend and model file lines for the startup banners.
pub fn model_status(config: &AppConfig) -> Vec<String> {
    let info = config.model_info();
    let file = if info.exists {
        format!("{} ({:.1} MB)", info.path.display(), info.size_mb)
    } else {
        format!("{} (not found)", info.path.display())
    };
    let mut lines = vec![format!("Backend:  {}", config.model.backend)];
    if config.model.backend == Backend::Server {
        lines.push(format!("Server:   {}", config.model.server_url));
    }
    lines.push(format!("Model:    {} [{}]", config.model.name, config.model.template));
    lines.push(format!("File:     {file}"));
    lines
}

/// How a rendered turn ended.
pub enum Outcome {
    Answered(GenerationResult),
    Failed(String),
    Interrupted,
}

/// Drain one turn's events, showing progress while chunks arrive. Ctrl+C
/// drops the stream, which cancels generation and commits nothing.
pub async fn render(mut events: ReceiverStream<SessionEvent>) -> anyhow::Result<Outcome> {
    let mut received = 0usize;
    let mut stderr = std::io::stderr();
    eprint!("  Thinking...");

    let outcome = loop {
        tokio::select! {
            event = events.next() => match event {
                Some(SessionEvent::Chunk { content }) => {
                    received += content.chars().count();
                    eprint!("\r  Thinking... {received} chars");
                    stderr.flush()?;
                }
                Some(SessionEvent::Done { result }) => break Outcome::Answered(result),
                Some(SessionEvent::Error { message }) => break Outcome::Failed(message),
                None => break Outcome::Failed("Error: generation ended unexpectedly".into()),
            },
            _ = tokio::signal::ctrl_c() => break Outcome::Interrupted,
        }
    };
    drop(events);

    eprint!("\r{:width$}\r", "", width = 40);
    stderr.flush()?;
    Ok(outcome)
}

/// Print a finished turn for the one-shot commands.
pub fn print_outcome(outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Answered(result) => {
            println!("{}", result.cleaned_text);
            Ok(())
        }
        Outcome::Failed(message) => bail!(message),
        Outcome::Interrupted => bail!("Interrupted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_a_loadable_starter_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rustscout").join("config.toml");

        let config = load_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.model.template, AppConfig::default().model.template);

        std::fs::write(&path, "[model]\nname = \"custom\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.model.name, "custom");
    }

    #[test]
    fn model_status_reports_file_size_or_absence() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.model.backend = Backend::Local;
        config.model.path = dir.path().join("missing.gguf");
        let lines = model_status(&config);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with("(not found)"));

        config.model.path = dir.path().join("model.gguf");
        std::fs::write(&config.model.path, vec![0u8; 1024 * 1024]).unwrap();
        config.model.backend = Backend::Server;
        let lines = model_status(&config);
        assert!(lines[1].starts_with("Server:"));
        assert!(lines[3].ends_with("(1.0 MB)"));
    }
}
