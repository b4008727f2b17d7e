//! Opening paths and files with the system handler

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use super::launch::ExecutableLocator;
use super::locations::resolve_search_locations;
use crate::tools::args::{self, OpenFileArgs, OpenPathArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Hand a path to the platform's default handler without waiting for it
pub fn open_with_system(path: &Path) -> Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    };

    spawn_detached(&mut cmd).with_context(|| format!("Failed to open {}", path.display()))
}

/// Start a process without waiting for it; a background task reaps it on exit
///
/// Must be called from within the tokio runtime.
pub fn spawn_detached(cmd: &mut Command) -> Result<()> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid = ?pid, %status, "Detached process exited"),
            Err(e) => warn!(pid = ?pid, error = %e, "Could not reap detached process"),
        }
    });
    Ok(())
}

/// Map spoken program names to executables
pub fn normalize_program_name(program: &str) -> String {
    let name = program.trim();
    let lower = name.to_lowercase();
    if matches!(lower.as_str(), "blocco note" | "blocconote" | "notepad") {
        return "notepad.exe".to_string();
    }
    if cfg!(target_os = "windows") && !lower.ends_with(".exe") && !lower.contains(' ') {
        return format!("{}.exe", name);
    }
    name.to_string()
}

/// Tool for opening an existing file or folder
pub struct OpenPathTool;

#[async_trait]
impl Tool for OpenPathTool {
    fn kind(&self) -> ActionKind {
        ActionKind::OpenPath
    }

    fn description(&self) -> &str {
        "Opens an existing file or folder with its default application."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "path",
            ParameterProperty::string("Full path of the file or folder"),
        )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<OpenPathArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<OpenPathArgs>(self.kind(), args).ok()?;
        let path = ctx.resolve(&args.path);
        path.exists()
            .then(|| PermissionRequest::new("open path", path.display().to_string(), true))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: OpenPathArgs = args::parse(self.kind(), args)?;
        let path = ctx.resolve(&args.path);
        if !path.exists() {
            return Ok(ToolResult::error(format!(
                "File or folder not found: '{}'",
                args.path
            )));
        }

        match open_with_system(&path) {
            Ok(()) => Ok(ToolResult::success(format!("'{}' opened.", path.display()))),
            Err(e) => Ok(ToolResult::error(format!("{:#}", e))),
        }
    }
}

/// Tool for opening a file by name from the usual user folders
pub struct OpenFileTool {
    locator: Arc<ExecutableLocator>,
}

impl OpenFileTool {
    pub fn new(locator: Arc<ExecutableLocator>) -> Self {
        Self { locator }
    }

    /// First existing `file_name` under the hinted folders, then the working directory
    fn find_file(&self, file_name: &str, location: Option<&str>, ctx: &ToolContext) -> Option<PathBuf> {
        let mut bases = resolve_search_locations(location);
        bases.push(ctx.working_dir.clone());
        bases
            .into_iter()
            .map(|base| base.join(file_name))
            .find(|candidate| candidate.exists())
    }
}

#[async_trait]
impl Tool for OpenFileTool {
    fn kind(&self) -> ActionKind {
        ActionKind::OpenFile
    }

    fn description(&self) -> &str {
        "Finds a file by name in Documents, Desktop, Downloads or the working directory and opens it."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("file_name", ParameterProperty::string("The file name, e.g. \"notes.txt\""))
            .with_property(
                "location",
                ParameterProperty::string("A hint like \"documents\", \"desktop\" or \"downloads\""),
            )
            .with_property(
                "program_name",
                ParameterProperty::string("Program to open the file with (default: system handler)"),
            )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<OpenFileArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<OpenFileArgs>(self.kind(), args).ok()?;
        let path = self.find_file(&args.file_name, args.location.as_deref(), ctx)?;
        let detail = match &args.program_name {
            Some(program) => format!("{} with {}", path.display(), normalize_program_name(program)),
            None => path.display().to_string(),
        };
        Some(PermissionRequest::new("open file", detail, true))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: OpenFileArgs = args::parse(self.kind(), args)?;
        let Some(path) = self.find_file(&args.file_name, args.location.as_deref(), ctx) else {
            return Ok(ToolResult::error(format!("File not found: '{}'", args.file_name)));
        };

        let Some(program) = args.program_name.as_deref() else {
            return match open_with_system(&path) {
                Ok(()) => Ok(ToolResult::success(format!("'{}' opened.", path.display()))),
                Err(e) => Ok(ToolResult::error(format!("{:#}", e))),
            };
        };

        let normalized = normalize_program_name(program);
        let Some(executable) = self.locator.locate(&normalized).await else {
            return Ok(ToolResult::error(format!("Program '{}' not found.", program)));
        };

        match spawn_detached(Command::new(&executable).arg(&path)) {
            Ok(_) => Ok(ToolResult::success(format!(
                "'{}' opened with {}.",
                path.display(),
                normalized
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "Unable to start '{}': {}",
                executable.display(),
                e
            ))),
        }
    }
}
