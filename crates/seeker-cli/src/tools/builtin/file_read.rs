//! File read tool

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fs;

use crate::tools::args::{self, ReadFileArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Tool for reading file contents
pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadFile
    }

    fn description(&self) -> &str {
        "Reads the content of a text file."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Moderate
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "file_path",
            ParameterProperty::string("Path to the file (absolute or relative to the working directory)"),
        )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<ReadFileArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<ReadFileArgs>(self.kind(), args).ok()?;
        Some(PermissionRequest::new(
            "read file",
            ctx.resolve(&args.file_path).display().to_string(),
            false,
        ))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: ReadFileArgs = args::parse(self.kind(), args)?;
        let path = ctx.resolve(&args.file_path);

        if !path.exists() {
            return Ok(ToolResult::error(format!("File not found: {}", path.display())));
        }
        if !path.is_file() {
            return Ok(ToolResult::error(format!("Not a file: {}", path.display())));
        }

        match fs::read_to_string(&path) {
            Ok(content) => Ok(ToolResult::success(ctx.truncate(content))),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to read {}: {}",
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
    async fn test_read_relative_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "line 1\nline 2\n").unwrap();

        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        let result = FileReadTool
            .execute(&json!({ "file_path": "notes.txt" }), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "line 1\nline 2\n");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = FileReadTool
            .execute(&json!({ "file_path": "nope.txt" }), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.observation().starts_with("ERROR: File not found"));
    }

    #[tokio::test]
    async fn test_read_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = FileReadTool
            .execute(&json!({ "file_path": "." }), &ctx)
            .await
            .unwrap();
        assert!(result.error.unwrap().starts_with("Not a file"));
    }
}
