//! Parsing and validating the model's JSON actions

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::{ActionKind, ArgsError};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?(.*?)```").expect("valid fence regex"));

static POWERSHELL_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^powershell(?:\.exe)?\s+(?:-noprofile\s+)?-command\s+")
        .expect("valid powershell wrapper regex")
});

/// Strip markdown fences and surrounding prose down to one JSON object
///
/// A reply that already is an object is kept whole, so fences inside its
/// string values survive.
pub fn clean_json(raw: &str) -> String {
    let text = raw.trim();
    if text.starts_with('{') && is_object(text) {
        return text.to_string();
    }
    let fenced = FENCED_JSON
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| body.starts_with('{') && is_object(body));
    if let Some(body) = fenced {
        return body.to_string();
    }
    first_object(text).unwrap_or(text).to_string()
}

fn is_object(text: &str) -> bool {
    matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)))
}

/// First balanced `{...}` span, skipping braces inside strings
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// One parsed model reply: `{"thought"?, "action", "args"?}`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub thought: Option<String>,
    pub action: String,
    pub args: Value,
}

impl ActionResponse {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let cleaned = clean_json(raw);
        let value: Value = serde_json::from_str(&cleaned)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::MalformedJson("expected a JSON object".to_string()));
        };

        let action = match map.remove("action") {
            Some(Value::String(action)) if !action.trim().is_empty() => action.trim().to_string(),
            _ => return Err(ProtocolError::MissingAction),
        };
        let thought = match map.remove("thought") {
            Some(Value::String(thought)) => Some(thought),
            _ => None,
        };
        let args = match map.remove("args") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(args) => args,
        };

        Ok(Self {
            thought,
            action,
            args,
        })
    }

    /// `args.message` if it is a string
    pub fn message(&self) -> Option<&str> {
        self.args.get("message").and_then(Value::as_str)
    }
}

/// An action name resolved against the known set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Known(ActionKind),
    Unknown(String),
}

impl Action {
    pub fn resolve(name: &str) -> Self {
        match ActionKind::from_name(name) {
            Some(kind) => Action::Known(kind),
            None => Action::Unknown(name.to_string()),
        }
    }
}

/// A reply that breaks the action protocol; answered with a repair turn
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("response is not valid JSON ({0})")]
    MalformedJson(String),
    #[error("the 'action' field is missing")]
    MissingAction,
    #[error("action '{action}' is not allowed here. Allowed actions: {}", .allowed.join(", "))]
    NotPermitted {
        action: String,
        allowed: Vec<&'static str>,
    },
    #[error(transparent)]
    InvalidArgs(#[from] ArgsError),
}

impl ProtocolError {
    /// Corrective user turn appended before the next model call
    pub fn repair_instruction(&self) -> String {
        match self {
            ProtocolError::MalformedJson(_) => {
                "Error: respond ONLY with valid JSON. Fix the format.".to_string()
            }
            other => format!("Error: {}. Fix your JSON response.", other),
        }
    }
}

/// Drop a redundant `powershell -command` wrapper, the tool picks the shell itself
pub fn normalize_shell_command(command: &str) -> String {
    let trimmed = command.trim();
    let Some(found) = POWERSHELL_WRAPPER.find(trimmed) else {
        return trimmed.to_string();
    };
    let inner = trimmed[found.end()..].trim();
    let unquoted = ['"', '\'']
        .into_iter()
        .find_map(|q| inner.strip_prefix(q).and_then(|s| s.strip_suffix(q)))
        .unwrap_or(inner);
    unquoted.trim().to_string()
}

/// Per-action argument fixups applied before dispatch
pub fn normalize_args(kind: ActionKind, mut args: Value) -> Value {
    if kind == ActionKind::RunShellCommand {
        if let Some(Value::String(command)) = args.get_mut("command") {
            *command = normalize_shell_command(command);
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_strips_fences() {
        let raw = "Here you go:\n```json\n{\"action\": \"chat\"}\n```\nbye";
        assert_eq!(clean_json(raw), "{\"action\": \"chat\"}");
        assert_eq!(clean_json("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_fence_inside_message_is_kept() {
        let raw = "{\"action\":\"chat\",\"args\":{\"message\":\"Use:\\n```python\\nx = []\\n```\"}}";
        assert_eq!(clean_json(raw), raw);

        let parsed = ActionResponse::parse(raw).unwrap();
        assert_eq!(parsed.action, "chat");
        assert_eq!(parsed.message(), Some("Use:\n```python\nx = []\n```"));
    }

    #[test]
    fn test_fenced_reply_with_fence_inside_message() {
        let raw = "```json\n{\"action\":\"finish_task\",\"args\":{\"message\":\"Run ```ls``` there\"}}\n```";
        let parsed = ActionResponse::parse(raw).unwrap();
        assert_eq!(parsed.action, "finish_task");
        assert_eq!(parsed.message(), Some("Run ```ls``` there"));
    }

    #[test]
    fn test_clean_json_finds_object_in_prose() {
        let raw = r#"Sure. {"action": "chat", "args": {"message": "a } in text"}} Done."#;
        assert_eq!(
            clean_json(raw),
            r#"{"action": "chat", "args": {"message": "a } in text"}}"#
        );
        assert_eq!(clean_json("no json here"), "no json here");
    }

    #[test]
    fn test_parse_action_response() {
        let parsed = ActionResponse::parse(
            r#"{"thought": "greet", "action": "chat", "args": {"message": "hi"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.thought.as_deref(), Some("greet"));
        assert_eq!(parsed.action, "chat");
        assert_eq!(parsed.message(), Some("hi"));

        let bare = ActionResponse::parse(r#"{"action": "finish_task"}"#).unwrap();
        assert_eq!(bare.args, json!({}));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ActionResponse::parse("I think we should list files"),
            Err(ProtocolError::MalformedJson(_))
        ));
        assert!(matches!(
            ActionResponse::parse("[1, 2]"),
            Err(ProtocolError::MalformedJson(_))
        ));
        assert_eq!(
            ActionResponse::parse(r#"{"thought": "hmm"}"#),
            Err(ProtocolError::MissingAction)
        );
        assert_eq!(
            ActionResponse::parse(r#"{"action": "  "}"#),
            Err(ProtocolError::MissingAction)
        );
    }

    #[test]
    fn test_resolve_action() {
        assert_eq!(Action::resolve("search_files"), Action::Known(ActionKind::SearchFiles));
        assert_eq!(Action::resolve("delete_disk"), Action::Unknown("delete_disk".to_string()));
    }

    #[test]
    fn test_repair_instructions() {
        let malformed = ProtocolError::MalformedJson("eof".to_string());
        assert_eq!(
            malformed.repair_instruction(),
            "Error: respond ONLY with valid JSON. Fix the format."
        );

        let denied = ProtocolError::NotPermitted {
            action: "run_shell_command".to_string(),
            allowed: vec!["chat", "finish_task"],
        };
        assert_eq!(
            denied.repair_instruction(),
            "Error: action 'run_shell_command' is not allowed here. Allowed actions: chat, finish_task. Fix your JSON response."
        );
    }

    #[test]
    fn test_normalize_shell_command() {
        assert_eq!(
            normalize_shell_command(r#"powershell -NoProfile -Command "Get-StartApps""#),
            "Get-StartApps"
        );
        assert_eq!(
            normalize_shell_command("PowerShell.exe -command 'Get-Date'"),
            "Get-Date"
        );
        assert_eq!(normalize_shell_command("  dir C:\\ "), "dir C:\\");
    }

    #[test]
    fn test_normalize_args_only_touches_shell() {
        let args = normalize_args(
            ActionKind::RunShellCommand,
            json!({"command": "powershell -command \"ls\"", "description": "x"}),
        );
        assert_eq!(args["command"], "ls");

        let untouched = json!({"command": "powershell -command ls"});
        assert_eq!(normalize_args(ActionKind::ReadFile, untouched.clone()), untouched);
    }
}
