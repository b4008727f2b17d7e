//! Interactive REPL
//!
//! Readline input with persistent history; every line goes to the session.

use anyhow::Result;
use llm_core::{OllamaClient, OllamaStatus};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::session::{Reply, Session};

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const MAGENTA: &str = "\x1b[95m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

const EXIT_WORDS: &[&str] = &["exit", "quit", "/quit"];

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("seeker").join("history"))
}

pub fn is_exit(line: &str) -> bool {
    EXIT_WORDS.contains(&line.trim().to_lowercase().as_str())
}

/// Run the interactive REPL until exit, Ctrl-C or Ctrl-D
pub async fn run(settings: Arc<Settings>) -> Result<()> {
    check_ollama(&settings).await;
    let mut session = Session::connect(settings.clone())?;

    let history = history_path();
    let mut rl: Editor<(), DefaultHistory> = DefaultEditor::new()?;
    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(path);
    }

    print_welcome(&settings);

    loop {
        let prompt = format!("{}seeker>{} ", CYAN, RESET);
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if is_exit(line) {
                    println!("{}Goodbye!{}", DIM, RESET);
                    break;
                }

                for reply in session.process_input(line).await {
                    print_reply(&reply);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("{}Goodbye!{}", DIM, RESET);
                break;
            }
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            debug!(error = %e, "Could not save input history");
        }
    }
    Ok(())
}

/// Warn, without aborting, when Ollama or a configured model is missing
pub async fn check_ollama(settings: &Settings) {
    let client = match OllamaClient::new(settings.llm.ollama_url()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Could not build Ollama client");
            return;
        }
    };

    if client.status().await == OllamaStatus::Stopped {
        warn!(url = %client.base_url(), "Ollama is not reachable");
        eprintln!(
            "{}Warning:{} Ollama is not reachable at {}. Start it with: {}ollama serve{}",
            YELLOW,
            RESET,
            client.base_url(),
            BLUE,
            RESET
        );
        return;
    }

    let installed = match client.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "Could not list installed models");
            return;
        }
    };
    let models = &settings.llm.models;
    for wanted in [&models.primary, &models.router] {
        if !installed.iter().any(|m| m.matches(wanted)) {
            warn!(model = %wanted, "Configured model is not installed");
            eprintln!(
                "{}Warning:{} model {} is not installed. Pull it with: {}ollama pull {}{}",
                YELLOW, RESET, wanted, BLUE, wanted, RESET
            );
        }
    }
}

fn print_welcome(settings: &Settings) {
    println!();
    println!("{}seeker{} - local assistant", BOLD, RESET);
    println!(
        "{}Model: {}{}{}  Router: {}{}",
        DIM, RESET, BLUE, settings.llm.models.primary, RESET, settings.llm.models.router
    );
    println!(
        "{}Type {}/help{}{} for commands, {}exit{}{} to quit.{}",
        DIM, CYAN, RESET, DIM, CYAN, RESET, DIM, RESET
    );
    println!();
}

pub fn print_reply(reply: &Reply) {
    match reply {
        Reply::Assistant(message) => println!("{}>>{} {}", GREEN, RESET, message),
        Reply::Finished(message) => println!("{}>>{} {} {}✓{}", GREEN, RESET, message, GREEN, RESET),
        Reply::Failed(reason) => println!("{}Failed:{} {}", RED, RESET, reason),
        Reply::Notice(text) => println!("{}{}{}", DIM, text, RESET),
        Reply::ToolOutput { action, output } => {
            println!("{}[{}]{} {}", MAGENTA, action, RESET, output)
        }
    }
}
