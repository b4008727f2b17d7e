//! Built-in tools for the specialists

mod docs;
mod file_read;
mod file_write;
mod launch;
mod list_dir;
mod locations;
mod open;
mod search;
mod shell;
mod theme;
mod web_search;

pub use docs::{search_docs, DocsTool, NO_DOC_MATCHES};
pub use file_read::FileReadTool;
pub use file_write::{is_protected, FileWriteTool};
pub use launch::{ExecutableLocator, LaunchTool};
pub use list_dir::ListDirTool;
pub use locations::resolve_search_locations;
pub use open::{normalize_program_name, open_with_system, OpenFileTool, OpenPathTool};
pub use search::{OpenSearchUiTool, SearchFilesTool, NO_MATCHES_MESSAGE};
pub use shell::{run_shell, ShellTool};
pub use theme::ThemeTool;
pub use web_search::WebSearchTool;

use anyhow::Result;
use std::sync::Arc;

use super::registry::ToolRegistry;
use crate::config::PathsConfig;

/// Create a registry with every built-in tool
pub fn create_default_registry(paths: &PathsConfig) -> Result<ToolRegistry> {
    let locator = Arc::new(ExecutableLocator::new(&paths.program_dirs));
    let mut registry = ToolRegistry::new();

    // Safe tools (no confirmation needed)
    registry.register(DocsTool);
    registry.register(ListDirTool);
    registry.register(SearchFilesTool);

    // Moderate tools (reads, network access)
    registry.register(FileReadTool);
    registry.register(WebSearchTool::new()?);

    // Dangerous tools (write/execute/launch)
    registry.register(FileWriteTool);
    registry.register(ShellTool);
    registry.register(ThemeTool);
    registry.register(LaunchTool::new(locator.clone()));
    registry.register(OpenPathTool);
    registry.register(OpenFileTool::new(locator));
    registry.register(OpenSearchUiTool);

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ActionKind;

    #[test]
    fn test_every_non_terminal_action_has_a_tool() {
        let registry = create_default_registry(&PathsConfig::default()).unwrap();
        for kind in ActionKind::ALL {
            assert_eq!(
                registry.get(kind).is_some(),
                !kind.is_terminal(),
                "{kind}"
            );
        }
    }
}
