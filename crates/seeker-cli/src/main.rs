//! seeker: conversational command-line agent for a local Ollama
//!
//! Requests are classified, then handed to a specialist that may only use
//! the tools of its category.

mod agent;
mod classifier;
mod config;
mod context;
mod followup;
mod prompt;
mod repl;
mod session;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llm_core::OllamaClient;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::agent::OllamaTransport;
use crate::classifier::Classifier;
use crate::config::{Overrides, Settings};
use crate::session::{Reply, Session};

#[derive(Debug, Parser)]
#[command(name = "seeker")]
#[command(about = "Conversational command-line agent for local LLMs", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write every log event to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Primary model (overrides config)
    #[arg(short, long, global = true, env = "MODEL_NAME")]
    model: Option<String>,

    /// Router model used to classify requests
    #[arg(long, global = true, env = "ROUTER_MODEL_NAME")]
    router_model: Option<String>,

    /// Ollama base URL
    #[arg(long, global = true, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Approve every action without asking
    #[arg(long, global = true)]
    auto: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the interactive REPL (default)
    Chat,

    /// Handle a single request and exit
    Ask {
        /// The request
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Print the category a request would be routed to
    Classify {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Write a default config file to the user config directory
    InitConfig,
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    if let Some(Commands::InitConfig) = cli.command {
        let path = config::create_default()?;
        println!("Created {}", path.display());
        return Ok(());
    }

    let overrides = Overrides {
        model: cli.model,
        router_model: cli.router_model,
        ollama_url: cli.ollama_url,
        auto_approve: cli.auto,
    };
    let settings = Arc::new(Settings::load(&overrides)?);
    tracing::debug!(
        model = %settings.llm.models.primary,
        router = %settings.llm.models.router,
        url = %settings.llm.ollama_url(),
        "Settings loaded"
    );

    match cli.command {
        None | Some(Commands::Chat) => repl::run(settings).await,
        Some(Commands::Ask { prompt }) => {
            repl::check_ollama(&settings).await;
            let mut session = Session::connect(settings)?;
            let replies = session.process_input(&prompt.join(" ")).await;
            let failed = replies.iter().any(|r| matches!(r, Reply::Failed(_)));
            for reply in &replies {
                repl::print_reply(reply);
            }
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Classify { text }) => {
            let client = OllamaClient::new(settings.llm.ollama_url())?;
            let transport = Arc::new(OllamaTransport::new(client, settings.clone()));
            let classifier = Classifier::new(transport, &settings);
            println!("{}", classifier.classify(&text.join(" ")).await);
            Ok(())
        }
        Some(Commands::InitConfig) => Ok(()),
    }
}
