//! File write tool with protected paths and a diff preview

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use similar::TextDiff;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::tools::args::{self, WriteFileArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Resolve `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `target` is, or lies inside, one of the configured protected paths
pub fn is_protected(target: &Path, ctx: &ToolContext) -> bool {
    let target = normalize_lexically(&ctx.resolve(target));
    ctx.paths
        .protected
        .iter()
        .map(|p| normalize_lexically(&ctx.resolve(p)))
        .any(|protected| target.starts_with(&protected))
}

/// Unified diff between the current file content (if any) and the new content
fn render_diff(path: &Path, old: &str, new: &str) -> String {
    let name = path.display().to_string();
    let (a, b) = (format!("a/{}", name), format!("b/{}", name));
    let diff = TextDiff::from_lines(old, new);
    let mut unified = diff.unified_diff();
    unified.context_radius(3).header(&a, &b);
    unified.to_string()
}

/// Tool for writing file contents
pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn kind(&self) -> ActionKind {
        ActionKind::WriteFile
    }

    fn description(&self) -> &str {
        "Writes text to a file, replacing its content. Creates the file and parent directories if needed."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("file_path", ParameterProperty::string("Path to the file to write"))
            .with_required("content", ParameterProperty::string("The full new content"))
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<WriteFileArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<WriteFileArgs>(self.kind(), args).ok()?;
        let path = ctx.resolve(&args.file_path);
        if is_protected(&path, ctx) {
            // Refused in execute, nothing to approve
            return None;
        }

        let old = fs::read_to_string(&path).unwrap_or_default();
        let diff = render_diff(Path::new(&args.file_path), &old, &args.content);
        let detail = if diff.is_empty() {
            format!("{} (content unchanged)", path.display())
        } else {
            format!("{}\n{}", path.display(), diff.trim_end())
        };
        Some(PermissionRequest::new("write file", detail, true))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: WriteFileArgs = args::parse(self.kind(), args)?;
        let path = ctx.resolve(&args.file_path);

        if is_protected(&path, ctx) {
            warn!(path = %path.display(), "Refusing write to protected path");
            return Ok(ToolResult::error(format!(
                "Writing to '{}' is not allowed: the path is protected.",
                args.file_path
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    return Ok(ToolResult::error(format!("Failed to create directories: {}", e)));
                }
            }
        }

        match fs::write(&path, &args.content) {
            Ok(()) => Ok(ToolResult::success(format!(
                "File '{}' written ({} bytes).",
                path.display(),
                args.content.len()
            ))),
            Err(e) => Ok(ToolResult::error(format!("Failed to write file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx_in(dir: &Path) -> ToolContext {
        let paths = PathsConfig {
            protected: vec![PathBuf::from("crates/"), PathBuf::from("Cargo.toml")],
            ..Default::default()
        };
        ToolContext::new(dir.to_path_buf()).with_paths(Arc::new(paths))
    }

    #[tokio::test]
    async fn test_write_creates_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ctx_in(temp_dir.path());

        let result = FileWriteTool
            .execute(&json!({"file_path": "a/b/out.txt", "content": "hello"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("a/b/out.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_protected_paths_refused() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ctx_in(temp_dir.path());

        for target in ["Cargo.toml", "crates/seeker-cli/src/main.rs", "./docs/../crates/x.rs"] {
            let result = FileWriteTool
                .execute(&json!({"file_path": target, "content": "x"}), &ctx)
                .await
                .unwrap();
            assert!(!result.success, "{target} should be protected");
        }
        assert!(!temp_dir.path().join("Cargo.toml").exists());
    }

    #[test]
    fn test_similar_names_not_protected() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ctx_in(temp_dir.path());
        assert!(!is_protected(Path::new("Cargo.toml.bak"), &ctx));
        assert!(!is_protected(Path::new("crates2/x"), &ctx));
    }

    #[tokio::test]
    async fn test_permission_shows_diff() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "one\ntwo\n").unwrap();
        let ctx = ctx_in(temp_dir.path());

        let req = FileWriteTool
            .permission(&json!({"file_path": "notes.txt", "content": "one\nthree\n"}), &ctx)
            .await
            .unwrap();
        assert!(req.detail.contains("-two"));
        assert!(req.detail.contains("+three"));

        let protected = FileWriteTool
            .permission(&json!({"file_path": "Cargo.toml", "content": ""}), &ctx)
            .await;
        assert!(protected.is_none());
    }
}
