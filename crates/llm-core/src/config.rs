//! Configuration management for seeker.toml
//!
//! Only the model-facing sections live here (`[ollama]`, `[models]`, `[router]`).
//! The agent binary reads its own sections from the same file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Name of the project-local configuration file
pub const CONFIG_FILE_NAME: &str = "seeker.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub models: ModelsConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model driving the specialist loop
    pub primary: String,
    /// Cheap model used for request classification
    pub router: String,
    pub max_output_tokens: i32,
    pub context_window: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub timeout_secs: u64,
    /// Classifications reporting a lower confidence fall back to general chat
    pub confidence_threshold: f64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            primary: "gemma2:2b".to_string(),
            router: "llama3.2:1b".to_string(),
            max_output_tokens: 500,
            context_window: 8192,
            temperature: 0.1,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 45,
            confidence_threshold: 0.45,
        }
    }
}

impl Config {
    /// Find seeker.toml in the current directory or its parents, then in the user config dir
    pub fn find_config_path() -> Option<PathBuf> {
        if let Ok(mut current) = std::env::current_dir() {
            for _ in 0..10 {
                let candidate = current.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    return Some(candidate);
                }
                if !current.pop() {
                    break;
                }
            }
        }

        let user = Self::user_config_path()?;
        user.exists().then_some(user)
    }

    /// Per-user configuration file location
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seeker").join("config.toml"))
    }

    /// Apply environment overrides using the given lookup
    ///
    /// Takes a lookup function instead of reading the process environment so the
    /// precedence rules can be tested without mutating global state.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama.url = url;
        }
        if let Some(model) = lookup("MODEL_NAME") {
            self.models.primary = model;
        }
        if let Some(model) = lookup("ROUTER_MODEL_NAME") {
            self.models.router = model;
        }
        if let Some(v) = parse_env(&lookup, "ROUTER_TIMEOUT") {
            self.router.timeout_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "ROUTER_CONFIDENCE_THRESHOLD") {
            self.router.confidence_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, "MAX_OUTPUT_TOKENS") {
            self.models.max_output_tokens = v;
        }
    }

    /// Base URL for API calls, tolerating the legacy full-endpoint form
    pub fn ollama_url(&self) -> String {
        let url = self.ollama.url.trim().trim_end_matches('/');
        let url = url
            .strip_suffix("/api/chat")
            .or_else(|| url.strip_suffix("/api/generate"))
            .unwrap_or(url);
        url.to_string()
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
