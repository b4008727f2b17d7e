//! llm-core: Shared library for talking to a local Ollama server
//!
//! Provides:
//! - Configuration loading (seeker.toml + environment overrides)
//! - Ollama API client (chat and generate endpoints)

pub mod config;
pub mod ollama;

pub use config::{Config, ModelsConfig, OllamaConfig, RouterConfig, CONFIG_FILE_NAME};
pub use ollama::{ChatMessage, ChatOptions, Model, OllamaClient, OllamaStatus, Role};
