//! Specialist loop
//!
//! One run per request: call the model, validate its JSON action, dispatch
//! it, feed the result back, until the model answers with `chat` or
//! `finish_task` or a budget runs out.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use llm_core::ChatMessage;
use tracing::{debug, error, info, instrument, warn};

use super::action::{normalize_args, Action, ActionResponse, ProtocolError};
use super::state::{LoopState, Phase, SearchEvent, TurnOutcome, TurnReport};
use super::transport::ModelTransport;
use crate::classifier::Category;
use crate::config::Settings;
use crate::prompt::{assemble_prompt, PromptEnvironment};
use crate::tools::args::{self, ChatArgs, FinishArgs, SearchArgs};
use crate::tools::registry::toolset_for;
use crate::tools::router::{RouteResult, ToolRouter};
use crate::tools::{ActionKind, ToolCall, ToolContext};

// ANSI colors
const BLUE: &str = "\x1b[94m";
const MAGENTA: &str = "\x1b[95m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// `finish_task` without a message
pub const DEFAULT_FINISH_MESSAGE: &str = "Task completed successfully.";

const PREVIEW_CHARS: usize = 300;

/// Drives one category's specialist through the action protocol
pub struct SpecialistLoop {
    transport: Arc<dyn ModelTransport>,
    router: Arc<ToolRouter>,
    settings: Arc<Settings>,
    env: PromptEnvironment,
    model_timeout: Duration,
    show_progress: bool,
}

impl SpecialistLoop {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        router: Arc<ToolRouter>,
        settings: Arc<Settings>,
        env: PromptEnvironment,
    ) -> Self {
        Self {
            model_timeout: settings.model_timeout(),
            show_progress: std::io::stdout().is_terminal(),
            transport,
            router,
            settings,
            env,
        }
    }

    #[cfg(test)]
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    /// Run the loop to a terminal outcome; never fails outward
    #[instrument(skip_all, fields(category = %category))]
    pub async fn run(&self, category: Category, input: &str, ctx: &ToolContext) -> TurnReport {
        let toolset = toolset_for(category);
        let system_prompt = assemble_prompt(
            category,
            &self.env,
            &self.settings.cookbook,
            self.router.registry(),
        );
        let mut state = LoopState::new(
            input,
            self.settings.agent.max_iterations,
            self.settings.agent.max_repair_attempts,
        );

        let mut phase = Phase::AwaitingModel;
        loop {
            phase = match phase {
                Phase::AwaitingModel => self.await_model(&system_prompt, &mut state).await,
                Phase::Parsing(raw) => match self.validate(&raw, toolset) {
                    Ok((kind, response)) => {
                        state.record_valid_action();
                        Phase::Dispatching {
                            raw,
                            kind,
                            response,
                        }
                    }
                    Err(e) => self.repair(raw, e, &mut state),
                },
                Phase::Dispatching {
                    raw,
                    kind,
                    response,
                } => self.dispatch(raw, kind, response, ctx, &mut state).await,
                Phase::Terminal(outcome) => {
                    info!(
                        iterations = state.iterations,
                        repairs = state.repairs,
                        outcome = ?outcome,
                        "Specialist loop finished"
                    );
                    return state.finish(outcome);
                }
            };
        }
    }

    async fn await_model(&self, system_prompt: &str, state: &mut LoopState) -> Phase {
        if !state.begin_iteration() {
            warn!(iterations = state.iterations, "Iteration budget exhausted");
            return Phase::Terminal(TurnOutcome::Failed {
                reason: format!(
                    "Stopped after {} model calls without finishing the task.",
                    state.iterations
                ),
            });
        }

        debug!(iteration = state.iterations, messages = state.history.len(), "Calling model");
        let spinner = self.spinner();
        let reply = tokio::time::timeout(
            self.model_timeout,
            self.transport.respond(system_prompt, &state.history),
        )
        .await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        match reply {
            Ok(raw) => Phase::Parsing(raw),
            Err(_) => {
                error!(timeout_ms = self.model_timeout.as_millis() as u64, "Model call timed out");
                Phase::Terminal(TurnOutcome::Failed {
                    reason: format!(
                        "The model did not answer within {} seconds.",
                        self.model_timeout.as_secs_f32()
                    ),
                })
            }
        }
    }

    /// Parse, check membership in the toolset, and check arguments
    fn validate(
        &self,
        raw: &str,
        toolset: &[ActionKind],
    ) -> Result<(ActionKind, ActionResponse), ProtocolError> {
        let mut response = ActionResponse::parse(raw)?;

        let kind = match Action::resolve(&response.action) {
            Action::Known(kind) if toolset.contains(&kind) => kind,
            _ => {
                return Err(ProtocolError::NotPermitted {
                    action: response.action.clone(),
                    allowed: toolset.iter().map(|k| k.as_str()).collect(),
                })
            }
        };

        response.args = normalize_args(kind, std::mem::take(&mut response.args));
        match kind {
            ActionKind::Chat => {
                args::parse::<ChatArgs>(kind, &response.args)?;
            }
            ActionKind::FinishTask => {
                args::parse::<FinishArgs>(kind, &response.args)?;
            }
            _ => {
                if let Some(tool) = self.router.registry().get(kind) {
                    tool.validate(&response.args)?;
                }
            }
        }
        Ok((kind, response))
    }

    fn repair(&self, raw: String, error: ProtocolError, state: &mut LoopState) -> Phase {
        if !state.record_repair() {
            warn!(attempt = state.consecutive_repairs(), error = %error, "Repair budget exhausted");
            return Phase::Terminal(TurnOutcome::Failed {
                reason: format!("The model kept sending invalid responses: {}", error),
            });
        }

        warn!(attempt = state.consecutive_repairs(), error = %error, "Protocol error, requesting a repair");
        debug!(raw = %raw, "Rejected model reply");
        state.history.push(ChatMessage::assistant(raw));
        state.history.push(ChatMessage::user(error.repair_instruction()));
        Phase::AwaitingModel
    }

    async fn dispatch(
        &self,
        raw: String,
        kind: ActionKind,
        response: ActionResponse,
        ctx: &ToolContext,
        state: &mut LoopState,
    ) -> Phase {
        if self.settings.agent.verbose {
            if let Some(thought) = response.thought.as_deref().filter(|t| !t.trim().is_empty()) {
                println!("{}Thought:{} {}", BLUE, RESET, thought);
            }
        }
        info!(action = %kind, iteration = state.iterations, "Dispatching action");

        match kind {
            ActionKind::Chat => {
                let message = response.message().unwrap_or_default().to_string();
                state.history.push(ChatMessage::assistant(raw));
                Phase::Terminal(TurnOutcome::Replied { message })
            }
            ActionKind::FinishTask => {
                let message = response
                    .message()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(DEFAULT_FINISH_MESSAGE)
                    .to_string();
                state.history.push(ChatMessage::assistant(raw));
                Phase::Terminal(TurnOutcome::Finished { message })
            }
            _ => {
                let call = ToolCall::new(kind, response.args);
                let result = self.router.route(&call, ctx).await;
                if let RouteResult::InvalidArgs(e) = result {
                    return self.repair(raw, ProtocolError::InvalidArgs(e), state);
                }

                if kind == ActionKind::SearchFiles {
                    if let Ok(search) = args::parse::<SearchArgs>(kind, &call.arguments) {
                        state.searches.push(SearchEvent {
                            query: search.query,
                            location: search.location,
                            matches: result.matches(),
                        });
                    }
                }

                let observation = ctx.truncate(result.observation());
                if self.settings.agent.verbose {
                    println!(
                        "{}[{}]{} {}{}{}",
                        MAGENTA,
                        kind,
                        RESET,
                        DIM,
                        preview(&observation),
                        RESET
                    );
                }

                state.history.push(ChatMessage::assistant(raw));
                state.history.push(ChatMessage::user(format!(
                    "Result of action '{}': {}",
                    kind, observation
                )));
                Phase::AwaitingModel
            }
        }
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("{} is thinking...", self.settings.llm.models.primary));
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
