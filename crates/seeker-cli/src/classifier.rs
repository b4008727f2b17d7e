//! Request classification
//!
//! Ordered regex heuristics settle unambiguous requests locally. Anything
//! else goes to a small router model, and every doubt on that path
//! (bad output, low confidence, timeout, transport error) lands on
//! general chat, which has no tools.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::agent::action::clean_json;
use crate::agent::transport::ClassifierTransport;
use crate::config::Settings;

/// Prefix of local slash commands
pub const COMMAND_PREFIX: char = '/';

/// Execution context a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ProgrammingQuestion,
    SystemCommand,
    GeneralChat,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::ProgrammingQuestion,
        Category::SystemCommand,
        Category::GeneralChat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::ProgrammingQuestion => "programming_question",
            Category::SystemCommand => "system_command",
            Category::GeneralChat => "general_chat",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static SYSTEM_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\b(apri|lancia|avvia|installa|disinstalla|esegui)\b",
        r"\b(open|launch|lounch|start|run|execute|install|uninstall)\b",
        r"\b(cerca|trova|ricerca|dove)\b",
        r"\b(search|find|locate|where)\b",
        r"\b(manual|manuals|handbook)\b",
        r"\b(copia|sposta|rinomina|elimina|cancella)\b",
        r"\b(copy|move|rename|delete|remove)\b",
        r"\b(file|cartell|directory|percorso|path)\b",
        r"\b(documents|documenti|desktop)\b",
        r"\b(mostr(a|ami)|lista|elenca)\b.*\b(file|cartell|directory)\b",
        r"\b(list|show)\b.*\b(files|folders|directories)\b",
        r"\b(theme|dark|light)\b",
        r"\b(tema|scuro|chiaro)\b",
        r"\bwindows\b.*\b(theme|tema|dark|light|scuro|chiaro)\b",
        r"\bchange\b.*\b(theme|dark|light)\b",
        r"\b(cambia|imposta)\b.*\b(tema|scuro|chiaro)\b",
        r"\b(cmd|powershell|terminal|shell)\b",
    ])
    .expect("valid system patterns")
});

static PROGRAMMING_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\bpython\b",
        r"\bjavascript\b",
        r"\btypescript\b",
        r"\bjava\b",
        r"\bc\+\+",
        r"\bc#",
        r"\brust\b",
        r"\bgolang\b",
        r"\bsql\b",
        r"\bregex\b",
        r"\bapi\b",
        r"\bhttp\b",
        r"\btraceback\b",
        r"\bstack\s*trace\b",
        r"\bexception\b",
        r"\berror\b",
        r"\bbug\b",
        r"\bfunzione\b",
        r"\bclasse\b",
        r"\bmodulo\b",
        r"\bimport\b",
        r"\bdef\b",
        r"\bpackage\b",
        r"\bpip\b",
        r"\bnpm\b",
        r"\bcome\s+si\s+fa\b",
        r"\bhow\s+do\s+i\b",
        r"\bin\s+(python|javascript|js|java)\b",
    ])
    .expect("valid programming patterns")
});

/// Classify without the network, when the text is unambiguous
pub fn heuristic_route(input: &str) -> Option<Category> {
    let text = input.trim().to_lowercase();
    if text.is_empty() {
        return Some(Category::GeneralChat);
    }
    if text.starts_with(COMMAND_PREFIX) {
        return Some(Category::SystemCommand);
    }
    if SYSTEM_PATTERNS.is_match(&text) {
        return Some(Category::SystemCommand);
    }
    if PROGRAMMING_PATTERNS.is_match(&text) {
        return Some(Category::ProgrammingQuestion);
    }
    None
}

const ROUTER_PROMPT_TEMPLATE: &str = r#"You are a request routing assistant. Your only job is to classify the user's request into one of the following categories. Ignore conversational filler like 'ciao', 'per favore', 'mi potresti', 'vorrei', 'please', 'could you' and focus solely on the core task.

The available categories are:
- "programming_question": For questions about how to code, programming concepts, "how do I...", code examples, debugging, algorithms, syntax, "in Python", "in JavaScript", etc.
- "system_command": For requests to run shell commands, launch programs, list or manage files/directories, install software, or interact directly with the operating system. Examples: "apri notepad", "lancia VS Code", "mostrami i file", "installa un programma", "copia questo file", "che ore sono?".
- "general_chat": For greetings, non-task-related conversation, or when the user is asking you a question directly that doesn't fit the other categories. Examples: "ciao", "come stai?", "raccontami una barzelletta", "chi sei?".

Output ONLY valid JSON and nothing else.
JSON schema:
{
  "category": "programming_question | system_command | general_chat",
  "confidence": 0.0-1.0,
  "reason": "short explanation"
}

User Request: "{user_input}"

JSON:
"#;

pub fn router_prompt(input: &str) -> String {
    ROUTER_PROMPT_TEMPLATE.replace("{user_input}", input)
}

/// What the router model said, loosely parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterVerdict {
    pub category: String,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
}

/// Parse router output, tolerating fences and prose around the JSON
///
/// Output that is not a JSON object is taken as a bare category label.
pub fn parse_router_output(raw: &str) -> RouterVerdict {
    let cleaned = clean_json(raw);
    let map = match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => map,
        _ => {
            return RouterVerdict {
                category: normalize_category(&cleaned),
                ..Default::default()
            }
        }
    };

    let category = match map.get("category") {
        Some(Value::String(s)) => normalize_category(s),
        Some(other) => normalize_category(&other.to_string()),
        None => String::new(),
    };
    let confidence = match map.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let reason = map.get("reason").and_then(Value::as_str).map(str::to_string);

    RouterVerdict {
        category,
        confidence,
        reason,
    }
}

fn normalize_category(value: &str) -> String {
    value.trim().to_lowercase().replace(['`', '"'], "")
}

/// Heuristics first, router model second, general chat on any doubt
pub struct Classifier {
    transport: Arc<dyn ClassifierTransport>,
    timeout: Duration,
    confidence_threshold: f64,
}

impl Classifier {
    pub fn new(transport: Arc<dyn ClassifierTransport>, settings: &Settings) -> Self {
        Self::with_limits(
            transport,
            settings.router_timeout(),
            settings.llm.router.confidence_threshold,
        )
    }

    pub fn with_limits(
        transport: Arc<dyn ClassifierTransport>,
        timeout: Duration,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            transport,
            timeout,
            confidence_threshold,
        }
    }

    /// Never fails; uncertainty resolves to `GeneralChat`
    pub async fn classify(&self, input: &str) -> Category {
        if let Some(category) = heuristic_route(input) {
            debug!(category = %category, "Router heuristic matched");
            return category;
        }

        let prompt = router_prompt(input);
        let raw = match tokio::time::timeout(self.timeout, self.transport.classify(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(error = %format!("{:#}", e), "Router call failed, falling back to general_chat");
                return Category::GeneralChat;
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Router call timed out, falling back to general_chat");
                return Category::GeneralChat;
            }
        };

        self.decide(&parse_router_output(&raw))
    }

    fn decide(&self, verdict: &RouterVerdict) -> Category {
        let Some(category) = Category::from_label(&verdict.category) else {
            warn!(category = %verdict.category, "Router returned an unexpected category, falling back to general_chat");
            return Category::GeneralChat;
        };

        if let Some(confidence) = verdict.confidence {
            if confidence < self.confidence_threshold {
                warn!(confidence, category = %category, "Router confidence too low, falling back to general_chat");
                return Category::GeneralChat;
            }
        }

        info!(category = %category, confidence = ?verdict.confidence, reason = ?verdict.reason, "Router classified request");
        category
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::testing::ScriptedClassifier;

    fn scripted(reply: Result<&str, &str>) -> (Classifier, Arc<ScriptedClassifier>) {
        let transport = Arc::new(ScriptedClassifier::new(reply));
        let classifier = Classifier::with_limits(transport.clone(), Duration::from_secs(5), 0.45);
        (classifier, transport)
    }

    #[tokio::test]
    async fn test_system_heuristics_skip_network() {
        let (classifier, transport) = scripted(Ok(r#"{"category":"general_chat"}"#));
        for input in [
            "apri notepad",
            "trova manuale dnd",
            "Launch VS Code",
            "metti il tema scuro",
            "show me the files in this folder",
            "/init",
        ] {
            assert_eq!(classifier.classify(input).await, Category::SystemCommand, "{input}");
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_programming_heuristics() {
        let (classifier, transport) = scripted(Ok("general_chat"));
        assert_eq!(
            classifier.classify("come si fa una lista in python").await,
            Category::ProgrammingQuestion
        );
        assert_eq!(
            classifier.classify("why does my C++ code segfault").await,
            Category::ProgrammingQuestion
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_general_chat() {
        let (classifier, transport) = scripted(Ok(r#"{"category":"system_command"}"#));
        assert_eq!(classifier.classify("").await, Category::GeneralChat);
        assert_eq!(classifier.classify("   \t ").await, Category::GeneralChat);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_fallback() {
        let (classifier, transport) = scripted(Ok(
            "Sure!\n```json\n{\"category\": \"programming_question\", \"confidence\": 0.9, \"reason\": \"code\"}\n```",
        ));
        assert_eq!(
            classifier.classify("spiegami le closure").await,
            Category::ProgrammingQuestion
        );
        assert_eq!(transport.calls(), 1);
        assert!(transport.last_prompt().contains("User Request: \"spiegami le closure\""));
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back() {
        let (classifier, _) = scripted(Ok(r#"{"category": "system_command", "confidence": 0.2}"#));
        assert_eq!(classifier.classify("ciao amico").await, Category::GeneralChat);

        let (classifier, _) = scripted(Ok(r#"{"category": "system_command", "confidence": "0.44"}"#));
        assert_eq!(classifier.classify("ciao amico").await, Category::GeneralChat);
    }

    #[tokio::test]
    async fn test_unknown_category_and_errors_fall_back() {
        let (classifier, _) = scripted(Ok(r#"{"category": "weather"}"#));
        assert_eq!(classifier.classify("ciao amico").await, Category::GeneralChat);

        let (classifier, _) = scripted(Err("connection refused"));
        assert_eq!(classifier.classify("ciao amico").await, Category::GeneralChat);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let transport = Arc::new(
            ScriptedClassifier::new(Ok(r#"{"category":"system_command"}"#))
                .with_delay(Duration::from_secs(5)),
        );
        let classifier = Classifier::with_limits(transport, Duration::from_millis(20), 0.45);
        assert_eq!(classifier.classify("ciao amico").await, Category::GeneralChat);
    }

    #[test]
    fn test_reason_with_fence_is_parsed() {
        let verdict = parse_router_output(
            "{\"category\": \"programming_question\", \"confidence\": 0.8, \"reason\": \"asks about ```rust``` code\"}",
        );
        assert_eq!(verdict.category, "programming_question");
        assert_eq!(verdict.confidence, Some(0.8));
        assert_eq!(verdict.reason.as_deref(), Some("asks about ```rust``` code"));
    }

    #[test]
    fn test_bare_label_output() {
        let verdict = parse_router_output("  `System_Command` ");
        assert_eq!(verdict.category, "system_command");
        assert_eq!(verdict.confidence, None);
    }
}
