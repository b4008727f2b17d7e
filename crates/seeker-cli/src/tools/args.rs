//! Typed argument structs for every action
//!
//! The model's `args` object is checked against these before anything runs,
//! so a malformed call turns into a repair request instead of a tool failure.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::ActionKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("args for '{action}' must be a JSON object")]
    NotAnObject { action: &'static str },
    #[error("invalid args for '{action}': {reason}")]
    Invalid { action: &'static str, reason: String },
    #[error("argument '{field}' of '{action}' must not be empty")]
    Empty {
        action: &'static str,
        field: &'static str,
    },
}

/// Argument struct with optional semantic checks beyond deserialization
pub trait ToolArgs: DeserializeOwned {
    fn check(&self, _action: &'static str) -> Result<(), ArgsError> {
        Ok(())
    }
}

/// Deserialize and check `args` for the given action
///
/// A missing or null `args` is treated as an empty object.
pub fn parse<T: ToolArgs>(kind: ActionKind, args: &Value) -> Result<T, ArgsError> {
    let action = kind.as_str();
    let value = match args {
        Value::Null => Value::Object(Default::default()),
        Value::Object(_) => args.clone(),
        _ => return Err(ArgsError::NotAnObject { action }),
    };
    let parsed: T = serde_json::from_value(value).map_err(|e| ArgsError::Invalid {
        action,
        reason: e.to_string(),
    })?;
    parsed.check(action)?;
    Ok(parsed)
}

fn require(action: &'static str, field: &'static str, value: &str) -> Result<(), ArgsError> {
    if value.trim().is_empty() {
        Err(ArgsError::Empty { action, field })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatArgs {
    pub message: String,
}

impl ToolArgs for ChatArgs {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishArgs {
    #[serde(default)]
    pub message: Option<String>,
}

impl ToolArgs for FinishArgs {}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellArgs {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dir_path: Option<String>,
}

impl ToolArgs for ShellArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "command", &self.command)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadFileArgs {
    pub file_path: String,
}

impl ToolArgs for ReadFileArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "file_path", &self.file_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

impl ToolArgs for WriteFileArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "file_path", &self.file_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDirectoryArgs {
    #[serde(default = "default_dir")]
    pub dir_path: String,
    #[serde(default)]
    pub recursive: bool,
}

fn default_dir() -> String {
    ".".to_string()
}

impl ToolArgs for ListDirectoryArgs {}

/// Shared by documentation lookup and web search
#[derive(Debug, Clone, Deserialize)]
pub struct QueryArgs {
    pub query: String,
}

impl ToolArgs for QueryArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "query", &self.query)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeArgs {
    pub mode: String,
}

impl ToolArgs for ThemeArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "mode", &self.mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchArgs {
    pub program_name: String,
}

impl ToolArgs for LaunchArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "program_name", &self.program_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenPathArgs {
    pub path: String,
}

impl ToolArgs for OpenPathArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "path", &self.path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenFileArgs {
    pub file_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
}

impl ToolArgs for OpenFileArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "file_name", &self.file_name)
    }
}

/// Either a single string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Split a comma/space separated string or flatten the list, dropping leading dots
    pub fn into_list(self) -> Vec<String> {
        let raw = match self {
            OneOrMany::One(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
            OneOrMany::Many(items) => items,
        };
        raw.into_iter()
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extensions: Option<OneOrMany>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_true")]
    pub expand_query: bool,
}

fn default_max_results() -> usize {
    25
}

fn default_true() -> bool {
    true
}

impl ToolArgs for SearchArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "query", &self.query)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchUiArgs {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl ToolArgs for SearchUiArgs {
    fn check(&self, action: &'static str) -> Result<(), ArgsError> {
        require(action, "query", &self.query)
    }
}
