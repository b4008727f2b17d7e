//! One conversation: local commands, follow-ups, classification and the specialist loop

use anyhow::Result;
use llm_core::{ChatMessage, OllamaClient};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::{OllamaTransport, SpecialistLoop, TurnOutcome};
use crate::classifier::{Category, Classifier, COMMAND_PREFIX};
use crate::config::Settings;
use crate::context::{expand_mentions, init_notice, scan_directory, SCAN_MAX_FILES};
use crate::followup::{ConfirmationReply, FollowUpState};
use crate::prompt::PromptEnvironment;
use crate::tools::builtin::create_default_registry;
use crate::tools::router::ToolRouter;
use crate::tools::security::TerminalConfirmation;
use crate::tools::{ActionKind, ToolCall, ToolContext};

/// Acknowledgement when the user turns down a pending action
pub const DECLINED_MESSAGE: &str =
    "Ok, I won't open the interactive search. Tell me how to refine the search.";

pub const HELP_TEXT: &str = "\
Commands:
  @file      Attach a file to your request (e.g. 'Explain @main.py')
  /init      Scan the working directory and attach the listing to the next request
  /clear     Reset the conversation memory
  /help      Show this help
  /quit      Exit (also: exit, quit, Ctrl-D)";

/// Something to show the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The model's `chat` answer
    Assistant(String),
    /// The model's `finish_task` summary
    Finished(String),
    /// The turn ended without an answer
    Failed(String),
    /// Local information, not from the model
    Notice(String),
    /// Output of an action run outside the loop
    ToolOutput { action: ActionKind, output: String },
}

pub struct Session {
    classifier: Classifier,
    specialist: SpecialistLoop,
    settings: Arc<Settings>,
    ctx: ToolContext,
    history: Vec<ChatMessage>,
    followup: FollowUpState,
    /// Attached to the next request, set by /init
    pending_notice: Option<String>,
}

impl Session {
    pub fn new(
        classifier: Classifier,
        specialist: SpecialistLoop,
        settings: Arc<Settings>,
        ctx: ToolContext,
    ) -> Self {
        Self {
            classifier,
            specialist,
            settings,
            ctx,
            history: Vec::new(),
            followup: FollowUpState::new(),
            pending_notice: None,
        }
    }

    /// Wire the session to Ollama, the built-in tools and the terminal prompt
    pub fn connect(settings: Arc<Settings>) -> Result<Self> {
        let client = OllamaClient::new(settings.llm.ollama_url())?;
        let transport = Arc::new(OllamaTransport::new(client, settings.clone()));
        let registry = create_default_registry(&settings.paths)?;
        debug!(tools = registry.len(), "Tool registry ready");
        let router = Arc::new(ToolRouter::new(registry, TerminalConfirmation::new()));

        let env = PromptEnvironment::detect();
        let ctx = ToolContext::new(env.cwd.clone())
            .with_auto_mode(settings.agent.auto_approve)
            .with_paths(settings.paths.clone());

        let classifier = Classifier::new(transport.clone(), &settings);
        let specialist = SpecialistLoop::new(transport, router, settings.clone(), env);
        Ok(Self::new(classifier, specialist, settings, ctx))
    }

    /// Conversation of the last request
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn followup(&self) -> &FollowUpState {
        &self.followup
    }

    /// Handle one line of user input
    pub async fn process_input(&mut self, input: &str) -> Vec<Reply> {
        let input = input.trim();
        if input.is_empty() {
            return Vec::new();
        }
        if input.starts_with(COMMAND_PREFIX) {
            return vec![self.handle_local_command(input)];
        }

        let mut replies = Vec::new();
        let expansion = expand_mentions(input, &self.ctx.working_dir);
        if !expansion.attached.is_empty() {
            replies.push(Reply::Notice(format!(
                "Read and attached: {}",
                expansion.attached.join(", ")
            )));
        }
        let mut text = expansion.text;

        if let Some(pending) = self.followup.pending().cloned() {
            match ConfirmationReply::parse(&text) {
                ConfirmationReply::Affirm => {
                    self.followup.clear_pending();
                    info!(action = %pending.action, query = %pending.query, "Running confirmed action");
                    let result = self
                        .specialist
                        .router()
                        .route_approved(&pending.to_call(), &self.ctx)
                        .await;
                    replies.push(Reply::ToolOutput {
                        action: pending.action,
                        output: result.observation(),
                    });
                    return replies;
                }
                ConfirmationReply::Deny => {
                    self.followup.clear_pending();
                    info!(action = %pending.action, "Pending action declined");
                    replies.push(Reply::Assistant(DECLINED_MESSAGE.to_string()));
                    return replies;
                }
                ConfirmationReply::Other => {
                    debug!(action = %pending.action, "Input does not answer the pending confirmation");
                    replies.push(Reply::Notice(format!(
                        "Still waiting for a yes/no about '{}' for \"{}\". Handling this as a new request.",
                        pending.action, pending.query
                    )));
                }
            }
        }

        if let Some(augmented) = self.followup.augment_follow_up(&text) {
            debug!("Short input treated as a search follow-up");
            text = augmented;
        }

        let category = self.classifier.classify(&text).await;
        if self.settings.agent.verbose {
            replies.push(Reply::Notice(format!("Request classified as: {}", category)));
        }

        if let Some(notice) = self.pending_notice.take() {
            text = format!("{}\n\n{}", notice, text);
        }
        if category == Category::ProgrammingQuestion {
            text = self.with_documentation(&text).await;
        }

        let report = self.specialist.run(category, &text, &self.ctx).await;
        debug!(
            iterations = report.iterations,
            repairs = report.repairs,
            searches = report.searches.len(),
            "Specialist finished"
        );
        for event in &report.searches {
            self.followup.apply_search_event(event);
        }
        self.history = report.history;

        replies.push(match report.outcome {
            TurnOutcome::Replied { message } => Reply::Assistant(message),
            TurnOutcome::Finished { message } => Reply::Finished(message),
            TurnOutcome::Failed { reason } => {
                warn!(reason = %reason, "Turn failed");
                Reply::Failed(reason)
            }
        });
        replies
    }

    fn handle_local_command(&mut self, input: &str) -> Reply {
        let command = input
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match command.as_str() {
            "/init" => {
                let files = scan_directory(&self.ctx.working_dir, SCAN_MAX_FILES);
                info!(files = files.len(), "Scanned working directory");
                self.pending_notice = Some(init_notice(&files));
                Reply::Notice(format!(
                    "Scan complete: {} files. The listing will be attached to your next request.",
                    files.len()
                ))
            }
            "/clear" => {
                self.history.clear();
                self.followup.clear();
                self.pending_notice = None;
                info!("Conversation memory reset");
                Reply::Notice("Memory and history cleared.".to_string())
            }
            "/help" => Reply::Notice(HELP_TEXT.to_string()),
            other => Reply::Notice(format!("Unknown command: {}. Type /help for the list.", other)),
        }
    }

    /// Prefix a programming question with local documentation hits
    async fn with_documentation(&self, text: &str) -> String {
        let call = ToolCall::new(ActionKind::ConsultDocumentation, json!({ "query": text }));
        let docs = self
            .specialist
            .router()
            .route(&call, &self.ctx)
            .await
            .observation();

        format!(
            "The user asked: '{text}'

--- DOCUMENTATION START ---
{docs}
--- DOCUMENTATION END ---

Analyze the documentation results above. If they contain relevant information, even if not a perfect example, use your own knowledge to synthesize the correct answer and give it to the user with `chat` or `finish_task`. Do not call `consult_documentation` again if you already found relevant information. Use other tools (like `web_search`) only if the documentation is completely irrelevant."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::testing::{ScriptedClassifier, ScriptedModel};
    use crate::tools::args::{self, SearchArgs, SearchUiArgs};
    use crate::tools::builtin::NO_MATCHES_MESSAGE;
    use crate::tools::router::DENIED_MESSAGE;
    use crate::tools::security::AutoDeny;
    use crate::tools::{
        ArgsError, ParameterProperty, ParameterSchema, SecurityLevel, Tool, ToolRegistry,
        ToolResult,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    type Calls = Arc<Mutex<Vec<(ActionKind, Value)>>>;

    struct FakeSearch {
        kind: ActionKind,
        calls: Calls,
    }

    #[async_trait]
    impl Tool for FakeSearch {
        fn kind(&self) -> ActionKind {
            self.kind
        }

        fn description(&self) -> &str {
            "Fake search"
        }

        fn security_level(&self) -> SecurityLevel {
            match self.kind {
                ActionKind::SearchFiles => SecurityLevel::Safe,
                _ => SecurityLevel::Dangerous,
            }
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new().with_required("query", ParameterProperty::string("q"))
        }

        fn validate(&self, args: &Value) -> Result<(), ArgsError> {
            match self.kind {
                ActionKind::SearchFiles => args::parse::<SearchArgs>(self.kind, args).map(|_| ()),
                _ => args::parse::<SearchUiArgs>(self.kind, args).map(|_| ()),
            }
        }

        async fn execute(&self, args: &Value, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
            self.calls.lock().push((self.kind, args.clone()));
            Ok(match self.kind {
                ActionKind::SearchFiles => ToolResult::success(NO_MATCHES_MESSAGE).with_matches(0),
                _ => ToolResult::success("Interactive search opened."),
            })
        }
    }

    struct Harness {
        session: Session,
        model: Arc<ScriptedModel>,
        classifier: Arc<ScriptedClassifier>,
        calls: Calls,
        dir: TempDir,
    }

    fn harness(replies: &[&str], router_reply: &str) -> Harness {
        let dir = TempDir::new().unwrap();
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        for kind in [ActionKind::SearchFiles, ActionKind::OpenSearchUi] {
            registry.register(FakeSearch {
                kind,
                calls: calls.clone(),
            });
        }

        let mut settings = Settings::default();
        settings.agent.verbose = false;
        let settings = Arc::new(settings);

        let model = Arc::new(ScriptedModel::new(replies.iter().copied()));
        let classifier = Arc::new(ScriptedClassifier::new(Ok(router_reply)));
        let router = Arc::new(ToolRouter::new(registry, AutoDeny));
        let env = PromptEnvironment {
            os_name: "windows".to_string(),
            username: "tester".to_string(),
            cwd: dir.path().to_path_buf(),
        };
        let ctx = ToolContext::new(dir.path().to_path_buf());

        let session = Session::new(
            Classifier::with_limits(classifier.clone(), Duration::from_secs(5), 0.45),
            SpecialistLoop::new(model.clone(), router, settings.clone(), env),
            settings,
            ctx,
        );
        Harness {
            session,
            model,
            classifier,
            calls,
            dir,
        }
    }

    const EMPTY_SEARCH: &str =
        r#"{"thought":"search first","action":"search_files","args":{"query":"manuale dnd","location":"documenti"}}"#;
    const ASK_INTERACTIVE: &str =
        r#"{"action":"chat","args":{"message":"No files found. Open the interactive search?"}}"#;

    #[tokio::test]
    async fn test_zero_results_then_yes_opens_interactive_search() {
        let mut h = harness(&[EMPTY_SEARCH, ASK_INTERACTIVE], r#"{"category":"general_chat"}"#);

        let replies = h.session.process_input("trova manuale dnd").await;
        assert_eq!(
            replies.last(),
            Some(&Reply::Assistant("No files found. Open the interactive search?".to_string()))
        );
        assert!(h.session.followup().pending().is_some());

        let replies = h.session.process_input("si").await;
        assert_eq!(
            replies,
            vec![Reply::ToolOutput {
                action: ActionKind::OpenSearchUi,
                output: "Interactive search opened.".to_string(),
            }]
        );

        let calls = h.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, ActionKind::OpenSearchUi);
        assert_eq!(calls[1].1, json!({"query": "manuale dnd", "location": "documenti"}));
        assert_eq!(h.classifier.calls(), 0);
        assert_eq!(h.model.calls(), 2);
        assert!(h.session.followup().pending().is_none());
    }

    #[tokio::test]
    async fn test_unconfirmed_interactive_search_is_gated() {
        let mut h = harness(
            &[
                r#"{"action":"open_search_ui","args":{"query":"dnd"}}"#,
                r#"{"action":"chat","args":{"message":"Va bene."}}"#,
            ],
            "general_chat",
        );
        h.session.process_input("apri la ricerca per dnd").await;

        assert!(h.calls.lock().is_empty());
        let feedback = h.model.history(1).last().unwrap().content.clone();
        assert!(feedback.contains(DENIED_MESSAGE), "{feedback}");
    }

    #[tokio::test]
    async fn test_ok_is_an_affirmative() {
        let mut h = harness(&[EMPTY_SEARCH, ASK_INTERACTIVE], "general_chat");
        h.session.process_input("trova manuale dnd").await;
        h.session.process_input("ok").await;
        assert_eq!(h.calls.lock().last().unwrap().0, ActionKind::OpenSearchUi);
    }

    #[tokio::test]
    async fn test_no_clears_pending_without_running_anything() {
        let mut h = harness(&[EMPTY_SEARCH, ASK_INTERACTIVE], "general_chat");
        h.session.process_input("trova manuale dnd").await;

        let replies = h.session.process_input("no").await;
        assert_eq!(replies, vec![Reply::Assistant(DECLINED_MESSAGE.to_string())]);
        assert!(h.session.followup().pending().is_none());
        assert_eq!(h.calls.lock().len(), 1);
        assert_eq!(h.model.calls(), 2);
        assert_eq!(h.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_input_keeps_pending_and_reminds() {
        let mut h = harness(
            &[
                EMPTY_SEARCH,
                ASK_INTERACTIVE,
                r#"{"action":"chat","args":{"message":"Why did the cat sit on the laptop?"}}"#,
            ],
            r#"{"category":"general_chat","confidence":0.9}"#,
        );
        h.session.process_input("trova manuale dnd").await;

        let replies = h.session.process_input("tell me a joke about cats please").await;
        assert!(matches!(&replies[0], Reply::Notice(n) if n.contains("Still waiting")));
        assert!(matches!(replies.last(), Some(Reply::Assistant(_))));
        assert_eq!(h.classifier.calls(), 1);
        assert!(h.session.followup().pending().is_some());
    }

    #[tokio::test]
    async fn test_short_follow_up_is_augmented() {
        let mut h = harness(
            &[
                EMPTY_SEARCH,
                ASK_INTERACTIVE,
                r#"{"action":"finish_task","args":{"message":"done"}}"#,
            ],
            "general_chat",
        );
        h.session.process_input("trova manuale dnd").await;
        h.session.process_input("in downloads").await;

        let first = &h.model.history(2)[0].content;
        assert!(first.starts_with("Follow-up to a file search request. Previous query: manuale dnd."));
        assert!(first.ends_with("New input: in downloads"));
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let mut h = harness(&[EMPTY_SEARCH, ASK_INTERACTIVE], "general_chat");
        h.session.process_input("trova manuale dnd").await;
        assert!(!h.session.history().is_empty());

        let replies = h.session.process_input("/clear").await;
        assert!(matches!(&replies[0], Reply::Notice(_)));
        assert!(h.session.history().is_empty());
        assert!(h.session.followup().pending().is_none());
        assert!(h.session.followup().last_search().is_none());
    }

    #[tokio::test]
    async fn test_init_notice_goes_with_next_request() {
        let mut h = harness(&[r#"{"action":"chat","args":{"message":"hi"}}"#], "general_chat");
        std::fs::write(h.dir.path().join("notes.txt"), "x").unwrap();

        let replies = h.session.process_input("/init").await;
        assert!(matches!(&replies[0], Reply::Notice(n) if n.contains("1 files")));
        assert_eq!(h.model.calls(), 0);

        h.session.process_input("ciao").await;
        let first = &h.model.history(0)[0].content;
        assert!(first.starts_with("SYSTEM NOTICE"));
        assert!(first.contains("notes.txt"));
        assert!(first.ends_with("ciao"));
    }

    #[tokio::test]
    async fn test_local_commands_skip_the_model() {
        let mut h = harness(&[], "general_chat");
        assert_eq!(
            h.session.process_input("/help").await,
            vec![Reply::Notice(HELP_TEXT.to_string())]
        );
        assert!(matches!(
            &h.session.process_input("/frobnicate").await[0],
            Reply::Notice(n) if n.starts_with("Unknown command")
        ));
        assert!(h.session.process_input("   ").await.is_empty());
        assert_eq!(h.model.calls(), 0);
        assert_eq!(h.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_programming_question_is_prefixed_with_docs() {
        let mut h = harness(&[r#"{"action":"chat","args":{"message":"use append"}}"#], "general_chat");
        h.session.process_input("come si fa una lista in python").await;

        let first = &h.model.history(0)[0].content;
        assert!(first.starts_with("The user asked: 'come si fa una lista in python'"));
        assert!(first.contains("--- DOCUMENTATION START ---"));
    }
}
