//! Tool framework for the specialist loop
//!
//! Tools receive the model's `args` object, validate it into a typed argument
//! struct, and report a textual result. They never raise to the orchestrator:
//! failures travel back as `ToolResult` values.

pub mod args;
pub mod builtin;
pub mod registry;
pub mod router;
pub mod security;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::PathsConfig;

pub use args::ArgsError;
pub use registry::{ActionKind, ToolRegistry};
pub use security::PermissionRequest;

/// Prefix carried by every failed tool observation
pub const ERROR_MARKER: &str = "ERROR:";

/// Security classification for tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Read-only operations, no confirmation needed
    Safe,
    /// Reads outside the sandbox of the prompt or network access, confirm unless auto mode
    Moderate,
    /// Write/execute/launch operations, always confirm unless auto mode
    Dangerous,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityLevel::Safe => write!(f, "safe"),
            SecurityLevel::Moderate => write!(f, "moderate"),
            SecurityLevel::Dangerous => write!(f, "dangerous"),
        }
    }
}

/// Result of tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of matches, for tools that search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<usize>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            matches: None,
        }
    }

    /// Create a failed result
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            matches: None,
        }
    }

    /// Attach a match count
    pub fn with_matches(mut self, count: usize) -> Self {
        self.matches = Some(count);
        self
    }

    /// Text fed back to the model as the outcome of its action
    pub fn observation(&self) -> String {
        if self.success {
            return self.output.clone();
        }
        let error = self.error.as_deref().unwrap_or("tool failed");
        if self.output.is_empty() {
            format!("{} {}", ERROR_MARKER, error)
        } else {
            format!("{} {}\n{}", ERROR_MARKER, error, self.output)
        }
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Current working directory
    pub working_dir: PathBuf,
    /// Whether running in auto mode (skip confirmations)
    pub auto_mode: bool,
    /// Maximum output length (truncate if exceeded)
    pub max_output_len: usize,
    /// Default timeout for command execution in seconds
    pub command_timeout_secs: u64,
    /// Default timeout for HTTP requests in seconds
    pub http_timeout_secs: u64,
    /// Filesystem locations the tools work with
    pub paths: Arc<PathsConfig>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            auto_mode: false,
            max_output_len: 50000,
            command_timeout_secs: 60,
            http_timeout_secs: 30,
            paths: Arc::new(PathsConfig::default()),
        }
    }
}

impl ToolContext {
    /// Create a new context with the given working directory
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    /// Set auto mode
    pub fn with_auto_mode(mut self, auto: bool) -> Self {
        self.auto_mode = auto;
        self
    }

    /// Set the filesystem locations
    pub fn with_paths(mut self, paths: Arc<PathsConfig>) -> Self {
        self.paths = paths;
        self
    }

    /// Resolve a possibly relative path against the working directory
    pub fn resolve(&self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if path.is_absolute() {
            path
        } else {
            self.working_dir.join(path)
        }
    }

    /// Truncate output to the configured limit on a char boundary
    pub fn truncate(&self, output: String) -> String {
        if output.len() <= self.max_output_len {
            return output;
        }
        let safe_end = output
            .char_indices()
            .take_while(|(idx, _)| *idx < self.max_output_len)
            .last()
            .map(|(idx, c)| idx + c.len_utf8())
            .unwrap_or(0);
        format!(
            "{}\n\n[Output truncated at {} characters]",
            &output[..safe_end],
            safe_end
        )
    }
}

/// Schema for a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterProperty {
    /// Parameter type (string, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Parameter description
    pub description: String,
}

impl ParameterProperty {
    fn typed(param_type: &str, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.to_string(),
            description: description.into(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    /// A parameter accepting more than one JSON type, e.g. "array|string"
    pub fn either(param_type: &str, description: impl Into<String>) -> Self {
        Self::typed(param_type, description)
    }
}

/// Schema describing tool parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter properties, ordered by name
    pub properties: BTreeMap<String, ParameterProperty>,
    /// Required parameter names
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), prop);
        self.required.push(name);
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// Human-readable description of one action, as shown to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Render as a bullet block for the system prompt
    ///
    /// Required arguments are listed before optional ones.
    pub fn render(&self) -> String {
        let mut out = format!("- \"{}\": {}", self.name, self.description);
        let required = self
            .parameters
            .required
            .iter()
            .filter_map(|name| self.parameters.properties.get(name).map(|p| (name, p, true)));
        let optional = self
            .parameters
            .properties
            .iter()
            .filter(|(name, _)| !self.parameters.is_required(name))
            .map(|(name, p)| (name, p, false));

        for (name, prop, is_required) in required.chain(optional) {
            out.push_str(&format!(
                "\n  - \"{}\" ({}, {}): {}",
                name,
                prop.param_type,
                if is_required { "required" } else { "optional" },
                prop.description
            ));
        }
        out
    }
}

/// A dispatched action addressed to a tool
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub kind: ActionKind,
    /// Arguments as JSON
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(kind: ActionKind, arguments: Value) -> Self {
        Self { kind, arguments }
    }
}

/// The Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// The action this tool serves
    fn kind(&self) -> ActionKind;

    /// Wire name of the tool
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// Get the security level
    fn security_level(&self) -> SecurityLevel;

    /// Get the parameter schema
    fn parameters_schema(&self) -> ParameterSchema;

    /// Check the arguments against the tool's typed argument struct
    fn validate(&self, args: &Value) -> Result<(), ArgsError>;

    /// Approval needed before the tool takes effect, if any
    async fn permission(&self, args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
        match self.security_level() {
            SecurityLevel::Safe => None,
            level => Some(PermissionRequest::new(
                self.name().replace('_', " "),
                args.to_string(),
                level == SecurityLevel::Dangerous,
            )),
        }
    }

    /// Execute the tool with the given arguments
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult>;

    /// Convert to a definition for the prompt
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}
