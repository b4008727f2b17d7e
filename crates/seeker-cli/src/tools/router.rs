//! Tool routing and dispatch behind the permission gate

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;
use super::security::{announce_auto_approval, ConfirmationHandler, ConfirmationResult};
use super::{ActionKind, ArgsError, ToolCall, ToolContext, ToolResult, ERROR_MARKER};

/// Fixed observation for an action the user refused
pub const DENIED_MESSAGE: &str = "User denied the action.";

/// Result of routing a tool call
#[derive(Debug)]
pub enum RouteResult {
    /// Tool ran; it may still report a failure in its result
    Success(ToolResult),
    /// Tool execution was denied by user
    Denied,
    /// No tool registered for the action
    NotFound(ActionKind),
    /// Arguments did not match the tool's schema
    InvalidArgs(ArgsError),
    /// Error during execution
    Error(String),
}

impl RouteResult {
    /// Text fed back to the model
    pub fn observation(&self) -> String {
        match self {
            RouteResult::Success(result) => result.observation(),
            RouteResult::Denied => DENIED_MESSAGE.to_string(),
            RouteResult::NotFound(kind) => {
                format!("{} action '{}' is not available", ERROR_MARKER, kind)
            }
            RouteResult::InvalidArgs(e) => format!("{} {}", ERROR_MARKER, e),
            RouteResult::Error(e) => format!("{} {}", ERROR_MARKER, e),
        }
    }

    /// Match count reported by a search tool
    pub fn matches(&self) -> Option<usize> {
        match self {
            RouteResult::Success(result) => result.matches,
            _ => None,
        }
    }
}

/// Router for dispatching tool calls
pub struct ToolRouter {
    registry: ToolRegistry,
    confirmation: Arc<dyn ConfirmationHandler>,
    home_dir: Option<PathBuf>,
}

impl ToolRouter {
    /// Create a new router with the given registry and confirmation handler
    pub fn new(registry: ToolRegistry, confirmation: impl ConfirmationHandler + 'static) -> Self {
        Self {
            registry,
            confirmation: Arc::new(confirmation),
            home_dir: dirs::home_dir(),
        }
    }

    /// Override the directory used by the launch auto-approval rule
    #[cfg(test)]
    pub fn with_home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home_dir = home;
        self
    }

    /// Route a single tool call
    pub async fn route(&self, tool_call: &ToolCall, ctx: &ToolContext) -> RouteResult {
        self.dispatch(tool_call, ctx, false).await
    }

    /// Route a call the user already confirmed; the permission prompt is skipped
    pub async fn route_approved(&self, tool_call: &ToolCall, ctx: &ToolContext) -> RouteResult {
        self.dispatch(tool_call, ctx, true).await
    }

    #[instrument(skip(self, ctx), fields(tool = %tool_call.kind))]
    async fn dispatch(&self, tool_call: &ToolCall, ctx: &ToolContext, approved: bool) -> RouteResult {
        let tool = match self.registry.get(tool_call.kind) {
            Some(t) => t,
            None => {
                warn!(tool = %tool_call.kind, "Tool not found");
                return RouteResult::NotFound(tool_call.kind);
            }
        };

        if let Err(e) = tool.validate(&tool_call.arguments) {
            warn!(tool = %tool_call.kind, error = %e, "Rejected tool arguments");
            return RouteResult::InvalidArgs(e);
        }

        if let Some(request) = tool.permission(&tool_call.arguments, ctx).await {
            if approved {
                debug!(tool = %tool_call.kind, "Confirmed earlier by the user");
            } else if ctx.auto_mode {
                debug!(tool = %tool_call.kind, "Auto mode, skipping confirmation");
            } else if request.is_auto_approved(self.home_dir.as_deref()) {
                info!(tool = %tool_call.kind, target = %request.detail, "Launch under home directory auto-approved");
                announce_auto_approval(&request);
            } else {
                debug!(security_level = %tool.security_level(), "Requesting user confirmation");
                match self.confirmation.confirm(&request).await {
                    ConfirmationResult::Approved => {
                        info!(tool = %tool_call.kind, "User approved tool execution");
                    }
                    ConfirmationResult::Denied => {
                        info!(tool = %tool_call.kind, "User denied tool execution");
                        return RouteResult::Denied;
                    }
                }
            }
        }

        info!(tool = %tool_call.kind, "Executing tool");
        match tool.execute(&tool_call.arguments, ctx).await {
            Ok(result) => {
                if result.success {
                    info!(tool = %tool_call.kind, output_len = result.output.len(), "Tool executed successfully");
                } else {
                    warn!(tool = %tool_call.kind, error = ?result.error, "Tool execution failed");
                }
                RouteResult::Success(result)
            }
            Err(e) => {
                warn!(tool = %tool_call.kind, error = %e, "Tool execution error");
                RouteResult::Error(format!("{:#}", e))
            }
        }
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("registry", &self.registry)
            .field("home_dir", &self.home_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::args::{self, LaunchArgs, QueryArgs};
    use crate::tools::security::{AutoApprove, AutoDeny, PermissionRequest};
    use crate::tools::{ParameterSchema, SecurityLevel, Tool};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn kind(&self) -> ActionKind {
            ActionKind::ConsultDocumentation
        }

        fn description(&self) -> &str {
            "Echoes input"
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Safe
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new()
        }

        fn validate(&self, args: &Value) -> Result<(), ArgsError> {
            args::parse::<QueryArgs>(self.kind(), args).map(|_| ())
        }

        async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
            let args: QueryArgs = args::parse(self.kind(), args)?;
            Ok(ToolResult::success(args.query))
        }
    }

    /// Pretends every program lives at a fixed path
    struct FakeLauncher(PathBuf);

    #[async_trait]
    impl Tool for FakeLauncher {
        fn kind(&self) -> ActionKind {
            ActionKind::LaunchProgram
        }

        fn description(&self) -> &str {
            "Launches"
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Dangerous
        }

        fn parameters_schema(&self) -> ParameterSchema {
            ParameterSchema::new()
        }

        fn validate(&self, args: &Value) -> Result<(), ArgsError> {
            args::parse::<LaunchArgs>(self.kind(), args).map(|_| ())
        }

        async fn permission(&self, _args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
            Some(PermissionRequest::launch(self.0.clone()))
        }

        async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success("launched"))
        }
    }

    fn launch_call() -> ToolCall {
        ToolCall::new(ActionKind::LaunchProgram, json!({"program_name": "tool"}))
    }

    #[tokio::test]
    async fn test_router_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let router = ToolRouter::new(registry, AutoDeny);

        let call = ToolCall::new(ActionKind::ConsultDocumentation, json!({"query": "hello"}));
        let result = router.route(&call, &ToolContext::default()).await;
        // Safe tools never reach the confirmation handler
        assert_eq!(result.observation(), "hello");
    }

    #[tokio::test]
    async fn test_router_not_found() {
        let router = ToolRouter::new(ToolRegistry::new(), AutoApprove);
        let call = ToolCall::new(ActionKind::OpenPath, json!({"path": "/tmp"}));

        let result = router.route(&call, &ToolContext::default()).await;
        assert!(matches!(result, RouteResult::NotFound(ActionKind::OpenPath)));
        assert!(result.observation().starts_with(ERROR_MARKER));
    }

    #[tokio::test]
    async fn test_router_rejects_invalid_args() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let router = ToolRouter::new(registry, AutoApprove);

        let call = ToolCall::new(ActionKind::ConsultDocumentation, json!({"q": "typo"}));
        let result = router.route(&call, &ToolContext::default()).await;
        assert!(matches!(result, RouteResult::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_denied_yields_fixed_message() {
        let mut registry = ToolRegistry::new();
        registry.register(FakeLauncher(PathBuf::from("/opt/tool/tool")));
        let router = ToolRouter::new(registry, AutoDeny).with_home_dir(Some("/home/ada".into()));

        let result = router.route(&launch_call(), &ToolContext::default()).await;
        assert!(matches!(result, RouteResult::Denied));
        assert_eq!(result.observation(), DENIED_MESSAGE);
    }

    #[tokio::test]
    async fn test_launch_under_home_skips_prompt() {
        let mut registry = ToolRegistry::new();
        registry.register(FakeLauncher(PathBuf::from("/home/ada/bin/tool")));
        let router = ToolRouter::new(registry, AutoDeny).with_home_dir(Some("/home/ada".into()));

        let result = router.route(&launch_call(), &ToolContext::default()).await;
        assert_eq!(result.observation(), "launched");
    }

    #[tokio::test]
    async fn test_confirmed_call_skips_prompt() {
        let mut registry = ToolRegistry::new();
        registry.register(FakeLauncher(PathBuf::from("/opt/tool/tool")));
        let router = ToolRouter::new(registry, AutoDeny).with_home_dir(None);

        let result = router.route_approved(&launch_call(), &ToolContext::default()).await;
        assert_eq!(result.observation(), "launched");

        let invalid = ToolCall::new(ActionKind::LaunchProgram, json!({}));
        let result = router.route_approved(&invalid, &ToolContext::default()).await;
        assert!(matches!(result, RouteResult::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_auto_mode_skips_prompt() {
        let mut registry = ToolRegistry::new();
        registry.register(FakeLauncher(PathBuf::from("/opt/tool/tool")));
        let router = ToolRouter::new(registry, AutoDeny).with_home_dir(None);

        let ctx = ToolContext::default().with_auto_mode(true);
        let result = router.route(&launch_call(), &ctx).await;
        assert_eq!(result.observation(), "launched");
    }
}
