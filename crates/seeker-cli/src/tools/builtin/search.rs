//! File search (Everything CLI or a directory walk) and the interactive search UI

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::locations::resolve_search_locations;
use super::open::spawn_detached;
use crate::tools::args::{self, SearchArgs, SearchUiArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

/// Observation for a search with no hits; the session offers the interactive UI next
pub const NO_MATCHES_MESSAGE: &str = "No files found. Open the interactive search to refine it?";

const SEARCH_TIMEOUT_SECS: u64 = 30;
pub(crate) const MAX_WALK_DEPTH: usize = 8;

const STOPWORDS: &[&str] = &[
    "the", "my", "a", "an", "of", "on", "in", "to", "and", "files", "file", "manual", "manuals",
];

const DND_VARIANTS: &[&str] = &[
    "d&d",
    "dnd",
    "d and d",
    "dungeons and dragons",
    "players handbook",
    "phb",
];

/// Query variants; `d&d`-style queries expand into known synonyms
pub fn search_variants(query: &str, expand: bool) -> Vec<String> {
    let raw = query.trim();
    let lower = raw.to_lowercase();
    if expand && (lower.contains("d&d") || lower.contains("dnd") || lower.contains("d and d")) {
        return DND_VARIANTS.iter().map(|v| v.to_string()).collect();
    }
    if raw.is_empty() {
        Vec::new()
    } else {
        vec![raw.to_string()]
    }
}

/// Everything query syntax: variants joined with `|`, multi-word ones quoted
pub fn build_query_expr(query: &str, expand: bool) -> String {
    let variants = search_variants(query, expand);
    if variants.is_empty() {
        return query.trim().to_string();
    }
    variants
        .iter()
        .map(|v| if v.contains(' ') { format!("\"{}\"", v) } else { v.clone() })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Everything regex syntax: escaped variants joined with `|`
pub fn build_regex_expr(query: &str, expand: bool) -> String {
    search_variants(query, expand)
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|")
}

/// Lowercase, fold `d&d` spellings to `dnd` and treat separators as spaces
fn normalize_name(text: &str) -> String {
    let lower = text.to_lowercase().replace("d&d", "dnd").replace("d and d", "dnd");
    lower
        .chars()
        .map(|c| if matches!(c, '&' | '-' | '_' | '.') { ' ' } else { c })
        .collect()
}

/// Significant query tokens for name matching
pub fn search_tokens(query: &str) -> Vec<String> {
    let normalized = normalize_name(query);
    let tokens: Vec<String> = normalized
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        vec![normalized.trim().to_string()]
    } else {
        tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Files,
    Folders,
    Any,
}

impl EntryKind {
    fn parse(kind: Option<&str>) -> Self {
        match kind.map(|k| k.trim().to_lowercase()).as_deref() {
            Some("files") | Some("file") => EntryKind::Files,
            Some("folders") | Some("folder") => EntryKind::Folders,
            _ => EntryKind::Any,
        }
    }
}

/// Search criteria shared by both backends
#[derive(Debug, Clone)]
struct SearchPlan {
    query: String,
    variants: Vec<String>,
    tokens: Vec<String>,
    extensions: Vec<String>,
    kind: EntryKind,
    max_results: usize,
    sort: Option<String>,
    expand: bool,
}

impl SearchPlan {
    fn new(args: SearchArgs) -> Self {
        Self {
            variants: search_variants(&args.query, args.expand_query),
            tokens: search_tokens(&args.query),
            extensions: args.extensions.map(|e| e.into_list()).unwrap_or_default(),
            kind: EntryKind::parse(args.kind.as_deref()),
            max_results: args.max_results.max(1),
            sort: args.sort,
            expand: args.expand_query,
            query: args.query,
        }
    }

    /// Whether a file or folder name satisfies the query
    fn matches_name(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        if self.variants.len() > 1 {
            return self
                .variants
                .iter()
                .any(|v| normalized.contains(&normalize_name(v)));
        }
        self.tokens.iter().all(|t| normalized.contains(t.as_str()))
    }

    fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .map(|e| self.extensions.contains(&e))
            .unwrap_or(false)
    }

    /// Command-line arguments for Everything's `es`
    fn everything_args(&self, locations: &[PathBuf]) -> Vec<String> {
        let use_regex = (self.expand && self.variants.len() > 1) || self.query.contains('&');
        let mut expr = if use_regex {
            build_regex_expr(&self.query, self.expand)
        } else {
            build_query_expr(&self.query, false)
        };
        if !self.extensions.is_empty() {
            expr = format!("({}) ext:{}", expr, self.extensions.join(";"));
        }

        let mut cmd = vec![
            "-full-path-and-name".to_string(),
            "-n".to_string(),
            self.max_results.to_string(),
        ];
        if use_regex {
            cmd.push("-r".to_string());
        }
        if let Some(sort) = &self.sort {
            cmd.push(format!("-sort-{}", sort));
        }
        match self.kind {
            EntryKind::Files => cmd.push("/a-d".to_string()),
            EntryKind::Folders => cmd.push("/ad".to_string()),
            EntryKind::Any => {}
        }
        for location in locations {
            cmd.push("-path".to_string());
            cmd.push(location.display().to_string());
        }
        cmd.push(expr);
        cmd
    }
}

/// Walk the given roots and collect matching paths
fn walk_search(plan: &SearchPlan, roots: &[PathBuf]) -> Vec<String> {
    let mut hits = Vec::new();
    for root in roots {
        let entries = WalkDir::new(root)
            .max_depth(MAX_WALK_DEPTH)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok());

        for entry in entries {
            let is_dir = entry.file_type().is_dir();
            let wanted_kind = match plan.kind {
                EntryKind::Files => !is_dir,
                EntryKind::Folders => is_dir,
                EntryKind::Any => true,
            };
            if !wanted_kind || !plan.matches_extension(entry.path()) {
                continue;
            }
            if plan.matches_name(&entry.file_name().to_string_lossy()) {
                hits.push(entry.path().display().to_string());
                if hits.len() >= plan.max_results {
                    return hits;
                }
            }
        }
    }
    hits
}

async fn everything_search(es: &Path, plan: &SearchPlan, locations: &[PathBuf]) -> Result<Vec<String>, String> {
    let args = plan.everything_args(locations);
    debug!(?args, "Running Everything CLI");

    let mut cmd = Command::new(es);
    cmd.args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS), cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("File search failed: {}", e)),
        Err(_) => return Err(format!("File search timed out after {} seconds", SEARCH_TIMEOUT_SECS)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            return Err(format!("File search failed: {}", stderr));
        }
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(plan.max_results)
        .map(str::to_string)
        .collect())
}

/// Tool for searching files by name
pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn kind(&self) -> ActionKind {
        ActionKind::SearchFiles
    }

    fn description(&self) -> &str {
        "Searches files and folders by name in the user's folders and returns their full paths."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("query", ParameterProperty::string("Words from the file name"))
            .with_property(
                "location",
                ParameterProperty::string("A hint like \"documents\", \"desktop\" or \"downloads\""),
            )
            .with_property(
                "extensions",
                ParameterProperty::either("array|string", "File extensions, e.g. [\"pdf\"] or \"pdf,docx\""),
            )
            .with_property("kind", ParameterProperty::string("\"files\" or \"folders\""))
            .with_property("max_results", ParameterProperty::number("Maximum results (default: 25)"))
            .with_property(
                "sort",
                ParameterProperty::string("Sort order, e.g. \"date-modified-descending\""),
            )
            .with_property(
                "expand_query",
                ParameterProperty::boolean("Expand known synonyms (default: true)"),
            )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<SearchArgs>(self.kind(), args).map(|_| ())
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: SearchArgs = args::parse(self.kind(), args)?;
        let locations = resolve_search_locations(args.location.as_deref());
        let plan = SearchPlan::new(args);

        let hits = match ctx.paths.search_cli.as_deref().filter(|p| p.exists()) {
            Some(es) => everything_search(es, &plan, &locations).await,
            None => {
                let roots = if locations.is_empty() {
                    vec![ctx.working_dir.clone()]
                } else {
                    locations
                };
                let walk_plan = plan.clone();
                tokio::task::spawn_blocking(move || walk_search(&walk_plan, &roots))
                    .await
                    .map_err(|e| format!("File search failed: {}", e))
            }
        };

        match hits {
            Ok(hits) if hits.is_empty() => {
                Ok(ToolResult::success(NO_MATCHES_MESSAGE).with_matches(0))
            }
            Ok(hits) => {
                let count = hits.len();
                Ok(ToolResult::success(hits.join("\n")).with_matches(count))
            }
            Err(e) => {
                warn!(error = %e, "File search failed");
                Ok(ToolResult::error(e))
            }
        }
    }
}

/// Tool for opening the interactive search window with a query
pub struct OpenSearchUiTool;

#[async_trait]
impl Tool for OpenSearchUiTool {
    fn kind(&self) -> ActionKind {
        ActionKind::OpenSearchUi
    }

    fn description(&self) -> &str {
        "Opens the interactive file search window with a query. Use only after the user confirms."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("query", ParameterProperty::string("The search query, kept minimal"))
            .with_property(
                "location",
                ParameterProperty::string("A hint like \"documents\" or \"desktop\""),
            )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<SearchUiArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<SearchUiArgs>(self.kind(), args).ok()?;
        ctx.paths.search_gui.as_deref().filter(|p| p.exists())?;
        Some(PermissionRequest::new(
            "open interactive search",
            build_query_expr(&args.query, false),
            true,
        ))
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: SearchUiArgs = args::parse(self.kind(), args)?;
        let Some(gui) = ctx.paths.search_gui.as_deref().filter(|p| p.exists()) else {
            return Ok(ToolResult::error(
                "Interactive search UI not found. Set EVERYTHING_GUI_PATH.",
            ));
        };

        let expr = build_query_expr(&args.query, false);
        match spawn_detached(Command::new(gui).arg("-search").arg(&expr)) {
            Ok(_) => Ok(ToolResult::success(format!(
                "Interactive search opened for: {}",
                expr
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "Unable to open interactive search: {}",
                e
            ))),
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

    fn plan(value: Value) -> SearchPlan {
        SearchPlan::new(args::parse(ActionKind::SearchFiles, &value).unwrap())
    }

    #[test]
    fn test_dnd_variants() {
        assert_eq!(search_variants("manuale D&D", true).len(), DND_VARIANTS.len());
        assert_eq!(search_variants("manuale D&D", false), vec!["manuale D&D"]);
        assert_eq!(
            build_query_expr("dnd", true),
            "d&d | dnd | \"d and d\" | \"dungeons and dragons\" | \"players handbook\" | phb"
        );
        assert_eq!(build_regex_expr("tax 2023", false), "tax 2023");
    }

    #[test]
    fn test_tokens_drop_stopwords() {
        assert_eq!(search_tokens("the D&D manual"), vec!["dnd"]);
        assert_eq!(search_tokens("tax-return_2023"), vec!["tax", "return", "2023"]);
        // Only stopwords: fall back to the whole query
        assert_eq!(search_tokens("the file"), vec!["the file"]);
    }

    #[test]
    fn test_everything_args() {
        let p = plan(json!({"query": "invoice", "extensions": "pdf", "kind": "files", "max_results": 5}));
        let args = p.everything_args(&[PathBuf::from("/docs")]);
        assert_eq!(&args[..3], &["-full-path-and-name", "-n", "5"]);
        assert!(args.contains(&"/a-d".to_string()));
        assert!(!args.contains(&"-r".to_string()));
        assert_eq!(args.last().unwrap(), "(invoice) ext:pdf");

        let p = plan(json!({"query": "dnd"}));
        assert!(p.everything_args(&[]).contains(&"-r".to_string()));
    }

    #[test]
    fn test_name_matching() {
        let p = plan(json!({"query": "dnd"}));
        assert!(p.matches_name("Dungeons_and_Dragons_PHB.pdf"));
        assert!(p.matches_name("D&D 5e.pdf"));
        assert!(!p.matches_name("recipes.pdf"));

        let p = plan(json!({"query": "tax return"}));
        assert!(p.matches_name("2023-Tax-Return.pdf"));
        assert!(!p.matches_name("tax.pdf"));
    }

    #[tokio::test]
    async fn test_walk_backend_zero_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf())
            .with_paths(Arc::new(PathsConfig::default()));

        let walk = walk_search(&plan(json!({"query": "budget"})), &[dir.path().to_path_buf()]);
        assert!(walk.is_empty());

        let hits = walk_search(&plan(json!({"query": "notes", "extensions": ["txt"]})), &[dir.path().to_path_buf()]);
        assert_eq!(hits.len(), 1);

        // The tool itself may also see real user folders; only check shape
        let result = SearchFilesTool
            .execute(&json!({"query": "zz-no-such-file-4f1c"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, NO_MATCHES_MESSAGE);
        assert_eq!(result.matches, Some(0));
    }

    #[tokio::test]
    async fn test_search_ui_requires_gui() {
        let ctx = ToolContext::default().with_paths(Arc::new(PathsConfig {
            search_gui: Some(PathBuf::from("/definitely/not/Everything.exe")),
            ..Default::default()
        }));
        let args = json!({"query": "manuale dnd"});

        assert!(OpenSearchUiTool.permission(&args, &ctx).await.is_none());
        let result = OpenSearchUiTool.execute(&args, &ctx).await.unwrap();
        assert!(!result.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_ui_starts_the_gui() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let gui = dir.path().join("everything-gui");
        std::fs::write(&gui, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&gui, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ctx = ToolContext::new(dir.path().to_path_buf()).with_paths(Arc::new(PathsConfig {
            search_gui: Some(gui),
            ..Default::default()
        }));
        let result = OpenSearchUiTool
            .execute(&json!({"query": "manuale dnd"}), &ctx)
            .await
            .unwrap();
        assert!(result.success, "{}", result.observation());
        assert!(result.output.starts_with("Interactive search opened for:"));
    }
}
