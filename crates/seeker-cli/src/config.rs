//! Runtime settings for seeker
//!
//! One `Settings` value is built at startup from seeker.toml, the environment
//! and command-line flags, then shared read-only behind an `Arc`.

use anyhow::{Context, Result};
use llm_core::Config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// `[agent]` section: specialist loop limits and approval behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model calls allowed per request
    pub max_iterations: usize,
    /// Consecutive protocol repairs allowed before the turn fails
    pub max_repair_attempts: usize,
    /// Upper bound on a single primary model call
    pub model_timeout_secs: u64,
    /// Skip every confirmation prompt
    pub auto_approve: bool,
    /// Print the model's thoughts and tool results
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            max_repair_attempts: 3,
            model_timeout_secs: 180,
            auto_approve: false,
            verbose: true,
        }
    }
}

/// `[paths]` section: files and external programs the tools rely on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Pre-approved command cookbook shown to the model
    pub cookbook: PathBuf,
    /// Root of the local language documentation
    pub docs_dir: PathBuf,
    /// Everything command-line client (`es`)
    pub search_cli: Option<PathBuf>,
    /// Everything GUI
    pub search_gui: Option<PathBuf>,
    /// Extra roots searched for executables
    pub program_dirs: Vec<PathBuf>,
    /// Paths the agent may never write to, relative to the working directory
    pub protected: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cookbook: PathBuf::from("docs/cookbook.md"),
            docs_dir: PathBuf::from("language_docs"),
            search_cli: None,
            search_gui: None,
            program_dirs: Vec::new(),
            protected: ["crates/", "Cargo.toml", "Cargo.lock", "seeker.toml", "docs/"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
        }
    }
}

impl PathsConfig {
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("EVERYTHING_ES_PATH") {
            self.search_cli = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("EVERYTHING_GUI_PATH") {
            self.search_gui = Some(PathBuf::from(path));
        }
    }
}

/// Sections of seeker.toml owned by the binary
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AgentFile {
    agent: AgentConfig,
    paths: PathsConfig,
}

/// Command-line overrides, highest precedence
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub router_model: Option<String>,
    pub ollama_url: Option<String>,
    pub auto_approve: bool,
}

/// Everything the session needs to know, fixed at startup
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub llm: Config,
    pub agent: AgentConfig,
    pub paths: Arc<PathsConfig>,
    /// Cookbook text, empty when the file is missing
    pub cookbook: String,
}

impl Settings {
    /// Load from the first seeker.toml found, the process environment and the overrides
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let content = match Config::find_config_path() {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?
            }
            None => String::new(),
        };

        let mut settings = Self::from_parts(&content, |k| std::env::var(k).ok(), overrides)?;
        settings.cookbook = load_cookbook(&settings.paths.cookbook);
        Ok(settings)
    }

    /// Build from config text and an environment lookup; the cookbook is left empty
    pub fn from_parts<F>(content: &str, lookup: F, overrides: &Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut llm: Config = toml::from_str(content).context("Failed to parse configuration")?;
        let file: AgentFile = toml::from_str(content).context("Failed to parse configuration")?;
        let AgentFile { mut agent, mut paths } = file;

        llm.apply_env(&lookup);
        paths.apply_env(&lookup);

        if let Some(model) = &overrides.model {
            llm.models.primary = model.clone();
        }
        if let Some(model) = &overrides.router_model {
            llm.models.router = model.clone();
        }
        if let Some(url) = &overrides.ollama_url {
            llm.ollama.url = url.clone();
        }
        if overrides.auto_approve {
            agent.auto_approve = true;
        }

        Ok(Self {
            llm,
            agent,
            paths: Arc::new(paths),
            cookbook: String::new(),
        })
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.model_timeout_secs)
    }

    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.router.timeout_secs)
    }
}

fn load_cookbook(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cookbook not loaded, continuing without it");
            String::new()
        }
    }
}

/// Write a commented default config to the user config path
pub fn create_default() -> Result<PathBuf> {
    let path = Config::user_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

const DEFAULT_CONFIG: &str = r#"# seeker configuration
# A seeker.toml in the working directory (or a parent) takes precedence over this file.

[ollama]
url = "http://localhost:11434"

[models]
# Model driving the specialists
primary = "gemma2:2b"
# Small model used only to classify requests
router = "llama3.2:1b"
max_output_tokens = 500
context_window = 8192
temperature = 0.1

[router]
timeout_secs = 45
# Below this confidence a request is treated as general chat
confidence_threshold = 0.45

[agent]
max_iterations = 12
max_repair_attempts = 3
model_timeout_secs = 180
auto_approve = false
# Show the model's reasoning and tool results
verbose = true

[paths]
cookbook = "docs/cookbook.md"
docs_dir = "language_docs"
# search_cli = 'C:\Program Files\Everything\es.exe'
# search_gui = 'C:\Program Files\Everything\Everything.exe'
# program_dirs = ['D:\Games']
protected = ["crates/", "Cargo.toml", "Cargo.lock", "seeker.toml", "docs/"]
"#;
