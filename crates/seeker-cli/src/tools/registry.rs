//! Capability registry: known actions, their tools, and per-category toolsets

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ParameterProperty, ParameterSchema, Tool, ToolDefinition};
use crate::classifier::Category;

/// Every action the model may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Chat,
    FinishTask,
    ConsultDocumentation,
    ReadFile,
    WriteFile,
    ListDirectory,
    WebSearch,
    RunShellCommand,
    SetTheme,
    LaunchProgram,
    OpenPath,
    OpenFile,
    SearchFiles,
    OpenSearchUi,
}

impl ActionKind {
    pub const ALL: [ActionKind; 14] = [
        ActionKind::Chat,
        ActionKind::FinishTask,
        ActionKind::ConsultDocumentation,
        ActionKind::ReadFile,
        ActionKind::WriteFile,
        ActionKind::ListDirectory,
        ActionKind::WebSearch,
        ActionKind::RunShellCommand,
        ActionKind::SetTheme,
        ActionKind::LaunchProgram,
        ActionKind::OpenPath,
        ActionKind::OpenFile,
        ActionKind::SearchFiles,
        ActionKind::OpenSearchUi,
    ];

    /// Wire name used in the JSON protocol
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Chat => "chat",
            ActionKind::FinishTask => "finish_task",
            ActionKind::ConsultDocumentation => "consult_documentation",
            ActionKind::ReadFile => "read_file",
            ActionKind::WriteFile => "write_file",
            ActionKind::ListDirectory => "list_directory",
            ActionKind::WebSearch => "web_search",
            ActionKind::RunShellCommand => "run_shell_command",
            ActionKind::SetTheme => "set_theme",
            ActionKind::LaunchProgram => "launch_program",
            ActionKind::OpenPath => "open_path",
            ActionKind::OpenFile => "open_file",
            ActionKind::SearchFiles => "search_files",
            ActionKind::OpenSearchUi => "open_search_ui",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// `chat` and `finish_task` end the loop instead of dispatching
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Chat | ActionKind::FinishTask)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PROGRAMMING_TOOLSET: &[ActionKind] = &[
    ActionKind::ConsultDocumentation,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
    ActionKind::WebSearch,
    ActionKind::Chat,
    ActionKind::FinishTask,
];

const SYSTEM_TOOLSET: &[ActionKind] = &[
    ActionKind::RunShellCommand,
    ActionKind::SetTheme,
    ActionKind::LaunchProgram,
    ActionKind::OpenPath,
    ActionKind::OpenFile,
    ActionKind::SearchFiles,
    ActionKind::OpenSearchUi,
    ActionKind::ListDirectory,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
    ActionKind::Chat,
    ActionKind::FinishTask,
];

const CHAT_TOOLSET: &[ActionKind] = &[ActionKind::Chat, ActionKind::FinishTask];

/// Actions a category is allowed to use, in prompt order
pub fn toolset_for(category: Category) -> &'static [ActionKind] {
    match category {
        Category::ProgrammingQuestion => PROGRAMMING_TOOLSET,
        Category::SystemCommand => SYSTEM_TOOLSET,
        Category::GeneralChat => CHAT_TOOLSET,
    }
}

fn terminal_definition(kind: ActionKind) -> Option<ToolDefinition> {
    match kind {
        ActionKind::Chat => Some(ToolDefinition::new(
            kind.as_str(),
            "Replies to the user, asks a question or reports a result. Ends your turn.",
            ParameterSchema::new()
                .with_required("message", ParameterProperty::string("The text to show the user")),
        )),
        ActionKind::FinishTask => Some(ToolDefinition::new(
            kind.as_str(),
            "Declares the task complete. Ends your turn.",
            ParameterSchema::new()
                .with_property("message", ParameterProperty::string("A short final summary")),
        )),
        _ => None,
    }
}

/// Registry of available tools, keyed by action
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ActionKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any previous tool for the same action
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn Tool>> {
        self.tools.get(&kind).cloned()
    }

    /// Definition for an action, whether terminal or tool-backed
    pub fn definition(&self, kind: ActionKind) -> Option<ToolDefinition> {
        terminal_definition(kind).or_else(|| self.tools.get(&kind).map(|t| t.to_definition()))
    }

    /// Definitions for exactly the actions of a category's toolset
    pub fn definitions_for(&self, category: Category) -> Vec<ToolDefinition> {
        toolset_for(category)
            .iter()
            .filter_map(|kind| self.definition(*kind))
            .collect()
    }

    /// List all registered tool names
    pub fn list_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}
