//! Light/dark theme switching for Windows

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::shell::run_shell;
use crate::tools::args::{self, ThemeArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

const PERSONALIZE_KEY: &str = r"HKCU:\SOFTWARE\Microsoft\Windows\CurrentVersion\Themes\Personalize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThemeMode {
    Light,
    Dark,
}

impl ThemeMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_lowercase().as_str() {
            "light" | "chiaro" => Some(ThemeMode::Light),
            "dark" | "scuro" => Some(ThemeMode::Dark),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    /// Registry update followed by an explorer restart so the change applies
    fn command(self) -> String {
        let value = match self {
            ThemeMode::Light => 1,
            ThemeMode::Dark => 0,
        };
        format!(
            "Set-ItemProperty -Path {key} -Name AppsUseLightTheme -Value {value} -Type Dword -Force; \
             Set-ItemProperty -Path {key} -Name SystemUsesLightTheme -Value {value} -Type Dword -Force; \
             Stop-Process -Name explorer -Force; \
             Start-Process explorer.exe",
            key = PERSONALIZE_KEY,
            value = value
        )
    }
}

/// Tool for switching the Windows app and system theme
pub struct ThemeTool;

#[async_trait]
impl Tool for ThemeTool {
    fn kind(&self) -> ActionKind {
        ActionKind::SetTheme
    }

    fn description(&self) -> &str {
        "Switches the Windows app and system theme between light and dark."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "mode",
            ParameterProperty::string("Either \"light\" or \"dark\""),
        )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<ThemeArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<ThemeArgs>(self.kind(), args).ok()?;
        // Invalid modes fail in execute without touching anything
        let mode = ThemeMode::parse(&args.mode)?;
        Some(PermissionRequest::new(
            "set theme",
            format!("Switch to {} theme (restarts explorer)", mode.as_str()),
            true,
        ))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: ThemeArgs = args::parse(self.kind(), args)?;
        let Some(mode) = ThemeMode::parse(&args.mode) else {
            return Ok(ToolResult::error(format!(
                "Invalid theme mode '{}'. Use 'light' or 'dark'.",
                args.mode
            )));
        };

        if !cfg!(target_os = "windows") {
            return Ok(ToolResult::error(
                "Theme switching is only supported on Windows.",
            ));
        }

        let result = run_shell(&mode.command(), &ctx.working_dir, ctx.command_timeout_secs, ctx).await;
        if result.success {
            Ok(ToolResult::success(format!(
                "Theme set to {}.\n{}",
                mode.as_str(),
                result.output
            )))
        } else {
            Ok(result)
        }
    }
}
