//! Generator selection from configuration.

use std::sync::Arc;
use std::time::Duration;

use rustscout_config::{AppConfig, Backend};
use rustscout_core::error::Error;
use rustscout_core::generator::Generator;
use tracing::info;

use crate::completion::CompletionServerGenerator;

/// Build the configured generator.
///
/// `server` builds a completion-server client (no network traffic until the
/// first request). `local` validates the model path and loads the weights,
/// which can take a while for large files.
pub async fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Generator>, Error> {
    match config.model.backend {
        Backend::Server => {
            info!(
                url = %config.model.server_url,
                model = %config.model.name,
                "Using completion server backend"
            );
            let generator = CompletionServerGenerator::new(
                "llama-server",
                &config.model.server_url,
                &config.model.name,
                Duration::from_secs(config.llm.request_timeout_secs),
            )?;
            Ok(Arc::new(generator))
        }
        Backend::Local => build_local(config).await,
    }
}

#[cfg(feature = "local")]
async fn build_local(config: &AppConfig) -> Result<Arc<dyn Generator>, Error> {
    use crate::local::{LocalGenerator, LocalModelOptions};

    config.validate_model_path().map_err(|e| Error::Config {
        message: e.to_string(),
    })?;
    let generator = LocalGenerator::new(LocalModelOptions::from_config(config));
    generator.load().await?;
    Ok(Arc::new(generator))
}

#[cfg(not(feature = "local"))]
async fn build_local(_config: &AppConfig) -> Result<Arc<dyn Generator>, Error> {
    Err(Error::Config {
        message: "backend = \"local\" requires building with the `local` feature".into(),
    })
}
