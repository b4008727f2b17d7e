//! Cross-turn state: a pending yes/no confirmation and the last search

use serde_json::{json, Value};
use tracing::debug;

use crate::agent::SearchEvent;
use crate::tools::{ActionKind, ToolCall};

/// Inputs with at most this many words refine the previous search
const FOLLOW_UP_MAX_TOKENS: usize = 4;

/// An action proposed to the user and not yet dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub action: ActionKind,
    pub query: String,
    pub location: Option<String>,
}

impl PendingConfirmation {
    pub fn to_call(&self) -> ToolCall {
        let mut args = json!({ "query": self.query });
        if let (Some(location), Value::Object(map)) = (&self.location, &mut args) {
            map.insert("location".to_string(), Value::String(location.clone()));
        }
        ToolCall::new(self.action, args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchContext {
    pub query: String,
    pub location: Option<String>,
}

/// How an input answers a pending confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirm,
    Deny,
    Other,
}

impl ConfirmationReply {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" | "si" | "sì" | "ok" => ConfirmationReply::Affirm,
            "n" | "no" => ConfirmationReply::Deny,
            _ => ConfirmationReply::Other,
        }
    }
}

#[derive(Debug, Default)]
pub struct FollowUpState {
    pending: Option<PendingConfirmation>,
    last_search: Option<SearchContext>,
}

impl FollowUpState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier pending confirmation
    pub fn set_pending(&mut self, pending: PendingConfirmation) {
        debug!(action = %pending.action, query = %pending.query, "Pending confirmation installed");
        self.pending = Some(pending);
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn record_search(&mut self, query: impl Into<String>, location: Option<String>) {
        self.last_search = Some(SearchContext {
            query: query.into(),
            location,
        });
    }

    pub fn last_search(&self) -> Option<&SearchContext> {
        self.last_search.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.last_search = None;
    }

    /// Rewrite a short input as a refinement of the last search
    pub fn augment_follow_up(&self, input: &str) -> Option<String> {
        let search = self.last_search.as_ref()?;
        if input.split_whitespace().count() > FOLLOW_UP_MAX_TOKENS {
            return None;
        }
        Some(format!(
            "Follow-up to a file search request. Previous query: {}. Previous location: {}. New input: {}",
            search.query,
            search.location.as_deref().unwrap_or("None"),
            input
        ))
    }

    /// Remember a search; a search with no hits proposes the interactive search
    pub fn apply_search_event(&mut self, event: &SearchEvent) {
        self.record_search(event.query.clone(), event.location.clone());
        if event.matches == Some(0) {
            self.set_pending(PendingConfirmation {
                action: ActionKind::OpenSearchUi,
                query: event.query.clone(),
                location: event.location.clone(),
            });
        }
    }
}
