//! Directory listing tool

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use walkdir::WalkDir;

use crate::tools::args::{self, ListDirectoryArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, SecurityLevel, Tool, ToolContext,
    ToolResult,
};

/// Maximum entries reported by a recursive listing
const MAX_RECURSIVE_ENTRIES: usize = 500;

/// Tool for listing directory contents
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn kind(&self) -> ActionKind {
        ActionKind::ListDirectory
    }

    fn description(&self) -> &str {
        "Lists the files and folders in a directory. Folders end with '/'."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_property(
                "dir_path",
                ParameterProperty::string("Directory to list (default: current directory)"),
            )
            .with_property(
                "recursive",
                ParameterProperty::boolean("Include subdirectories (default: false)"),
            )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<ListDirectoryArgs>(self.kind(), args).map(|_| ())
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: ListDirectoryArgs = args::parse(self.kind(), args)?;
        let dir = ctx.resolve(&args.dir_path);

        if !dir.is_dir() {
            return Ok(ToolResult::error(format!(
                "Directory not found: {}",
                dir.display()
            )));
        }

        let mut entries = Vec::new();
        if args.recursive {
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .take(MAX_RECURSIVE_ENTRIES)
            {
                let rel = entry.path().strip_prefix(&dir).unwrap_or(entry.path());
                let mut name = rel.to_string_lossy().replace('\\', "/");
                if entry.file_type().is_dir() {
                    name.push('/');
                }
                entries.push(name);
            }
        } else {
            let read = match fs::read_dir(&dir) {
                Ok(read) => read,
                Err(e) => {
                    return Ok(ToolResult::error(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };
            for entry in read.filter_map(|e| e.ok()) {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    name.push('/');
                }
                entries.push(name);
            }
            entries.sort();
        }

        if entries.is_empty() {
            return Ok(ToolResult::success(format!("{} is empty.", dir.display())));
        }
        Ok(ToolResult::success(ctx.truncate(entries.join("\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("src/nested")).unwrap();
        fs::write(temp_dir.path().join("README.md"), "").unwrap();
        fs::write(temp_dir.path().join("src/main.rs"), "").unwrap();
        fs::write(temp_dir.path().join("src/nested/deep.rs"), "").unwrap();
        temp_dir
    }

    #[tokio::test]
    async fn test_flat_listing() {
        let temp_dir = fixture();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = ListDirTool.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(result.output, "README.md\nsrc/");
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let temp_dir = fixture();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = ListDirTool
            .execute(&json!({"dir_path": "src", "recursive": true}), &ctx)
            .await
            .unwrap();
        let lines: Vec<&str> = result.output.lines().collect();
        assert!(lines.contains(&"main.rs"));
        assert!(lines.contains(&"nested/"));
        assert!(lines.contains(&"nested/deep.rs"));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = ListDirTool
            .execute(&json!({"dir_path": "nope"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
    }
}
