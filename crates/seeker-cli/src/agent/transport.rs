//! Model transports
//!
//! The specialist loop and the classifier talk to the language model only
//! through these traits, so tests can script the model's replies.

use anyhow::Result;
use async_trait::async_trait;
use llm_core::{ChatMessage, ChatOptions, OllamaClient};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::Settings;

/// Primary model: system prompt plus history in, raw reply text out
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Never fails; transport errors come back as a `chat` action
    async fn respond(&self, system_prompt: &str, history: &[ChatMessage]) -> String;
}

/// Router model: one prompt in, raw completion out
#[async_trait]
pub trait ClassifierTransport: Send + Sync {
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// A well-formed `chat` action carrying `message`
pub fn synthetic_chat(message: &str) -> String {
    json!({
        "thought": "connection error",
        "action": "chat",
        "args": { "message": message }
    })
    .to_string()
}

/// Both transports backed by a local Ollama server
pub struct OllamaTransport {
    client: OllamaClient,
    settings: Arc<Settings>,
}

impl OllamaTransport {
    pub fn new(client: OllamaClient, settings: Arc<Settings>) -> Self {
        Self { client, settings }
    }

    fn options(&self) -> ChatOptions {
        let models = &self.settings.llm.models;
        ChatOptions::default()
            .with_temperature(models.temperature)
            .with_context_window(models.context_window)
            .with_max_tokens(models.max_output_tokens)
    }
}

#[async_trait]
impl ModelTransport for OllamaTransport {
    async fn respond(&self, system_prompt: &str, history: &[ChatMessage]) -> String {
        // The system prompt is rebuilt per call; stale ones never travel
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != llm_core::Role::System)
                .cloned(),
        );

        let model = &self.settings.llm.models.primary;
        debug!(model = %model, messages = messages.len(), "Calling primary model");
        match self.client.chat(model, &messages, &self.options(), true).await {
            Ok(content) => content,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Primary model call failed");
                synthetic_chat(&format!("Ollama connection error: {:#}", e))
            }
        }
    }
}

#[async_trait]
impl ClassifierTransport for OllamaTransport {
    async fn classify(&self, prompt: &str) -> Result<String> {
        let options = ChatOptions::default().with_temperature(0.0);
        self.client
            .generate(
                &self.settings.llm.models.router,
                prompt,
                &options,
                self.settings.router_timeout(),
            )
            .await
    }
}
