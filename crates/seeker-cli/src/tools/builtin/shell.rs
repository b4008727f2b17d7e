//! Shell command execution tool

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::tools::args::{self, ShellArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Cmdlets that need PowerShell rather than the default shell
const POWERSHELL_MARKERS: &[&str] = &["get-itemproperty", "set-itemproperty", "get-startapps"];

/// Program and leading arguments used to run `command`
fn shell_invocation(command: &str) -> (&'static str, &'static [&'static str]) {
    let lower = command.to_lowercase();
    if POWERSHELL_MARKERS.iter().any(|m| lower.contains(m)) {
        let program = if cfg!(target_os = "windows") {
            "powershell"
        } else {
            "pwsh"
        };
        return (program, &["-NoProfile", "-Command"]);
    }
    if cfg!(target_os = "windows") {
        ("cmd", &["/C"])
    } else {
        ("sh", &["-c"])
    }
}

/// Run a command through the platform shell and describe the outcome
///
/// A non-zero exit is still a successful run; the exit code is part of the text.
pub async fn run_shell(
    command: &str,
    working_dir: &Path,
    timeout_secs: u64,
    ctx: &ToolContext,
) -> ToolResult {
    if !working_dir.exists() {
        return ToolResult::error(format!(
            "Working directory does not exist: {}",
            working_dir.display()
        ));
    }

    let (program, leading) = shell_invocation(command);
    let mut cmd = Command::new(program);
    cmd.args(leading)
        .arg(command)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            let combined = combined.trim().to_string();
            let combined = if combined.is_empty() {
                "(no output)".to_string()
            } else {
                ctx.truncate(combined)
            };

            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ToolResult::success(format!("Exit Code: {}\nOut: {}", code, combined))
        }
        Ok(Err(e)) => ToolResult::error(format!("Failed to execute command: {}", e)),
        Err(_) => ToolResult::error(format!("Command timed out after {} seconds", timeout_secs)),
    }
}

/// Tool for executing shell commands
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn kind(&self) -> ActionKind {
        ActionKind::RunShellCommand
    }

    fn description(&self) -> &str {
        "Executes a system shell command and returns its exit code and output. Prefer commands from the cookbook."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("command", ParameterProperty::string("The command to execute"))
            .with_property(
                "description",
                ParameterProperty::string("What the command does, shown to the user"),
            )
            .with_property(
                "dir_path",
                ParameterProperty::string("Directory to run in (default: current directory)"),
            )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<ShellArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<ShellArgs>(self.kind(), args).ok()?;
        let detail = match args.description {
            Some(description) => format!("{}\n({})", args.command, description),
            None => args.command,
        };
        Some(PermissionRequest::new("run shell command", detail, true))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: ShellArgs = args::parse(self.kind(), args)?;
        let working_dir = args
            .dir_path
            .as_deref()
            .map(|dir| ctx.resolve(dir))
            .unwrap_or_else(|| ctx.working_dir.clone());

        Ok(run_shell(&args.command, &working_dir, ctx.command_timeout_secs, ctx).await)
    }
}
