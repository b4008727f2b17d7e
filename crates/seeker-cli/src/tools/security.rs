//! Security and confirmation handling for tools

use async_trait::async_trait;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const GREEN: &str = "\x1b[92m";
const CYAN: &str = "\x1b[96m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Check if stdin is connected to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// What a tool wants to do, shown to the user before it happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Short action label, e.g. "run shell command"
    pub label: String,
    /// Detail text: the command, path or diff
    pub detail: String,
    pub dangerous: bool,
    /// Resolved executable for program launches
    pub launch_target: Option<PathBuf>,
}

impl PermissionRequest {
    pub fn new(label: impl Into<String>, detail: impl Into<String>, dangerous: bool) -> Self {
        Self {
            label: label.into(),
            detail: detail.into(),
            dangerous,
            launch_target: None,
        }
    }

    /// A request to launch the given executable
    pub fn launch(path: PathBuf) -> Self {
        Self {
            label: "launch program".to_string(),
            detail: path.display().to_string(),
            dangerous: true,
            launch_target: Some(path),
        }
    }

    /// Launches of executables inside the user's home directory need no prompt
    pub fn is_auto_approved(&self, home: Option<&Path>) -> bool {
        match (&self.launch_target, home) {
            (Some(target), Some(home)) => target.is_absolute() && target.starts_with(home),
            _ => false,
        }
    }
}

/// Result of a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// User approved the action
    Approved,
    /// User denied the action
    Denied,
}

/// Trait for handling tool execution confirmations
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Request confirmation for a permission request
    async fn confirm(&self, request: &PermissionRequest) -> ConfirmationResult;
}

/// Print the notice shown when the home-directory rule approves a launch
pub fn announce_auto_approval(request: &PermissionRequest) {
    println!(
        "{}[AUTO-APPROVED]{} {}: {}",
        GREEN, RESET, request.label, request.detail
    );
}

/// Default terminal-based confirmation handler
pub struct TerminalConfirmation {
    /// Whether to auto-approve all actions
    pub auto_approve: bool,
}

impl TerminalConfirmation {
    pub fn new() -> Self {
        Self {
            auto_approve: false,
        }
    }

    pub fn auto() -> Self {
        Self { auto_approve: true }
    }
}

impl Default for TerminalConfirmation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmationHandler for TerminalConfirmation {
    async fn confirm(&self, request: &PermissionRequest) -> ConfirmationResult {
        if self.auto_approve {
            debug!(action = %request.label, "Auto-approving tool execution");
            return ConfirmationResult::Approved;
        }

        if !is_interactive() {
            warn!(
                action = %request.label,
                "Non-interactive mode: denying action that requires confirmation"
            );
            eprintln!(
                "{}[Warning]{} Non-interactive mode: '{}' requires confirmation but stdin is not a TTY.",
                YELLOW, RESET, request.label
            );
            eprintln!("Use --auto flag to bypass confirmations in non-interactive mode.");
            return ConfirmationResult::Denied;
        }

        let color = if request.dangerous { RED } else { YELLOW };
        println!();
        println!(
            "{}[PERMISSION REQUIRED]{} {}{}{}",
            color,
            RESET,
            BOLD,
            request.label.to_uppercase(),
            RESET
        );
        for line in request.detail.lines() {
            println!("  {}{}{}", CYAN, line, RESET);
        }

        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);

        // Keep asking until the answer is unambiguous
        loop {
            print!("Allow? (y/n): ");
            let _ = io::stdout().flush();

            let mut input = String::new();
            match reader.read_line(&mut input).await {
                Ok(0) | Err(_) => {
                    debug!("stdin closed during confirmation, denying");
                    return ConfirmationResult::Denied;
                }
                Ok(_) => {}
            }

            let result = match input.trim().to_lowercase().as_str() {
                "y" | "yes" => ConfirmationResult::Approved,
                "n" | "no" => ConfirmationResult::Denied,
                _ => continue,
            };
            debug!(action = %request.label, result = ?result, "User confirmation response");
            return result;
        }
    }
}

/// A confirmation handler that always approves (for testing or auto mode)
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _request: &PermissionRequest) -> ConfirmationResult {
        ConfirmationResult::Approved
    }
}

/// A confirmation handler that always denies (for testing)
pub struct AutoDeny;

#[async_trait]
impl ConfirmationHandler for AutoDeny {
    async fn confirm(&self, _request: &PermissionRequest) -> ConfirmationResult {
        ConfirmationResult::Denied
    }
}
