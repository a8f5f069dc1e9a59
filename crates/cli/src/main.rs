//! RustScout CLI, the terminal front-end.
//!
//! Commands:
//! - `chat`   Interactive session with `/mode`, `/search`, `/scrape`, `/reset`
//! - `ask`    One conversation turn
//! - `search` Answer from web search results
//! - `scrape` Answer a question about one web page

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "rustscout",
    about = "RustScout, a local LLM assistant with web search and page scraping",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.rustscout/config.toml)
    #[arg(short, long, global = true, env = "RUSTSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat
    Chat,

    /// Send a single message
    Ask {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Search the web and answer from the results
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Scrape a page and summarize it or answer a question about it
    Scrape {
        url: String,

        /// Question about the page (a summary is produced otherwise)
        #[arg(short, long)]
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    let assistant = commands::build_assistant(&config).await?;

    match cli.command {
        Commands::Chat => commands::chat::run(&assistant, &config).await?,
        Commands::Ask { text } => commands::ask::run(&assistant, &text.join(" ")).await?,
        Commands::Search { query } => commands::search::run(&assistant, &query.join(" ")).await?,
        Commands::Scrape { url, question } => {
            commands::scrape::run(&assistant, &url, question.as_deref()).await?
        }
    }

    Ok(())
}
