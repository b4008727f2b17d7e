//! Executable discovery and the program launch tool

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::search::MAX_WALK_DEPTH;

use super::open::open_with_system;
use crate::tools::args::{self, LaunchArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Directory names never descended into while searching for executables
const PRUNED_DIRS: &[&str] = &[
    "node_modules",
    "temp",
    "cache",
    "windowsapps",
    "$recycle.bin",
    "system volume information",
];

/// Finds executables by name, remembering every answer
#[derive(Debug, Default)]
pub struct ExecutableLocator {
    roots: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl ExecutableLocator {
    /// Search `extra_dirs` plus the usual application folders
    pub fn new(extra_dirs: &[PathBuf]) -> Self {
        let mut roots: Vec<PathBuf> = Vec::new();
        for var in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Some(dir) = std::env::var_os(var) {
                roots.push(PathBuf::from(dir));
            }
        }
        roots.extend(
            [dirs::data_local_dir(), dirs::data_dir(), dirs::desktop_dir()]
                .into_iter()
                .flatten(),
        );
        roots.extend(extra_dirs.iter().cloned());
        roots.dedup();
        Self::with_roots(roots)
    }

    /// Search only the given roots after `PATH`
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a program name to an absolute path
    ///
    /// The directory walk runs on the blocking pool.
    pub async fn locate(self: &Arc<Self>, name: &str) -> Option<PathBuf> {
        let key = name.to_lowercase();
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }

        let locator = Arc::clone(self);
        let owned = name.to_string();
        let found = match tokio::task::spawn_blocking(move || locator.search(&owned)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(program = name, error = %e, "Executable search aborted");
                return None;
            }
        };
        if found.is_none() {
            warn!(program = name, "Executable not found");
        }
        self.cache.lock().insert(key, found.clone());
        found
    }

    fn search(&self, name: &str) -> Option<PathBuf> {
        if let Ok(path) = which::which(name) {
            debug!(path = %path.display(), "Found in PATH");
            return Some(path);
        }

        let wanted = name.to_lowercase();
        for root in self.roots.iter().filter(|r| r.is_dir()) {
            debug!(root = %root.display(), "Searching for executable");
            if let Some(path) = find_in(root, &wanted) {
                debug!(path = %path.display(), "Found by directory walk");
                return Some(path);
            }
        }
        None
    }
}

fn find_in(root: &Path, wanted: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(MAX_WALK_DEPTH)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && PRUNED_DIRS.contains(&e.file_name().to_string_lossy().to_lowercase().as_str()))
        })
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy().to_lowercase() == wanted)
        .map(|e| e.into_path())
}

/// Tool for launching programs
pub struct LaunchTool {
    locator: Arc<ExecutableLocator>,
}

impl LaunchTool {
    pub fn new(locator: Arc<ExecutableLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl Tool for LaunchTool {
    fn kind(&self) -> ActionKind {
        ActionKind::LaunchProgram
    }

    fn description(&self) -> &str {
        "Launches a program by executable name, e.g. \"notepad.exe\" or \"code\"."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "program_name",
            ParameterProperty::string("The executable name"),
        )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<LaunchArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<LaunchArgs>(self.kind(), args).ok()?;
        // Unresolvable programs fail in execute without asking
        let path = self.locator.locate(args.program_name.trim()).await?;
        Some(PermissionRequest::launch(path))
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let args: LaunchArgs = args::parse(self.kind(), args)?;
        let name = args.program_name.trim();

        let Some(path) = self.locator.locate(name).await else {
            return Ok(ToolResult::error(format!(
                "Program '{}' not found. Unable to launch.",
                name
            )));
        };

        match open_with_system(&path) {
            Ok(()) => Ok(ToolResult::success(format!("'{}' launched.", name))),
            Err(e) => Ok(ToolResult::error(format!(
                "Unable to launch '{}': {:#}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_walk_finds_case_insensitively() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Apps/Tool")).unwrap();
        std::fs::write(dir.path().join("Apps/Tool/MyTool.EXE"), "").unwrap();

        let locator = Arc::new(ExecutableLocator::with_roots(vec![dir.path().to_path_buf()]));
        let found = locator.locate("mytool-not-on-path-7f3a.exe").await;
        assert!(found.is_none());
        assert_eq!(
            locator.locate("mytool.exe").await,
            Some(dir.path().join("Apps/Tool/MyTool.EXE"))
        );
    }

    #[tokio::test]
    async fn test_pruned_dirs_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/bin")).unwrap();
        std::fs::write(dir.path().join("node_modules/bin/hidden-tool-91c2"), "").unwrap();

        let locator = Arc::new(ExecutableLocator::with_roots(vec![dir.path().to_path_buf()]));
        assert!(locator.locate("hidden-tool-91c2").await.is_none());
    }

    #[tokio::test]
    async fn test_walk_depth_is_bounded() {
        let dir = TempDir::new().unwrap();
        let mut deep = dir.path().to_path_buf();
        for level in 0..=MAX_WALK_DEPTH {
            deep.push(format!("d{level}"));
        }
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("buried-tool-3b7e"), "").unwrap();
        std::fs::write(dir.path().join("d0/shallow-tool-3b7e"), "").unwrap();

        let locator = Arc::new(ExecutableLocator::with_roots(vec![dir.path().to_path_buf()]));
        assert!(locator.locate("buried-tool-3b7e").await.is_none());
        assert_eq!(
            locator.locate("shallow-tool-3b7e").await,
            Some(dir.path().join("d0/shallow-tool-3b7e"))
        );
    }

    #[tokio::test]
    async fn test_results_are_memoized() {
        let dir = TempDir::new().unwrap();
        let locator = Arc::new(ExecutableLocator::with_roots(vec![dir.path().to_path_buf()]));
        assert!(locator.locate("late-tool-55d1").await.is_none());

        // Appears after the first lookup; the cached miss still answers
        std::fs::write(dir.path().join("late-tool-55d1"), "").unwrap();
        assert!(locator.locate("late-tool-55d1").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_program_is_error_result() {
        let dir = TempDir::new().unwrap();
        let tool = LaunchTool::new(Arc::new(ExecutableLocator::with_roots(vec![
            dir.path().to_path_buf(),
        ])));
        let args = json!({"program_name": "no-such-program-e41b"});

        assert!(tool.permission(&args, &ToolContext::default()).await.is_none());
        let result = tool.execute(&args, &ToolContext::default()).await.unwrap();
        assert!(result.observation().contains("not found"));
    }

    #[tokio::test]
    async fn test_missing_program_never_reaches_the_prompt() {
        use crate::tools::registry::ToolRegistry;
        use crate::tools::router::{RouteResult, ToolRouter};
        use crate::tools::security::AutoDeny;
        use crate::tools::ToolCall;

        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(LaunchTool::new(Arc::new(ExecutableLocator::with_roots(vec![
            dir.path().to_path_buf(),
        ]))));
        let router = ToolRouter::new(registry, AutoDeny);

        let call = ToolCall::new(
            ActionKind::LaunchProgram,
            json!({"program_name": "no-such-program-e41b"}),
        );
        let result = router.route(&call, &ToolContext::default()).await;
        match result {
            RouteResult::Success(result) => {
                assert!(result.observation().contains("Program 'no-such-program-e41b' not found"))
            }
            other => panic!("expected a tool result, got {other:?}"),
        }
    }
}
