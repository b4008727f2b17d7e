//! Keyword lookup over the local language documentation

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::tools::args::{self, QueryArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, SecurityLevel, Tool, ToolContext,
    ToolResult,
};

const MAX_HITS: usize = 15;
const MAX_LINE_CHARS: usize = 150;

pub const NO_DOC_MATCHES: &str = "No matches found in the documentation.";

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "ad", "al", "alla", "allo", "anche", "ancora", "che", "chi", "ci", "cioè", "ciò",
        "come", "con", "contro", "da", "dal", "dalla", "dallo", "dei", "del", "della", "dello",
        "dentro", "di", "e", "ecco", "egli", "ella", "entrambi", "entrambe", "essi", "esse", "fa",
        "fai", "fanno", "fare", "ha", "hai", "hanno", "ho", "i", "il", "in", "indietro", "invece",
        "io", "la", "le", "lei", "lo", "loro", "lui", "ma", "me", "medesimo", "medesima", "mentre",
        "mio", "mia", "miei", "mie", "modo", "molto", "molti", "molte", "ne", "negli", "nei",
        "nel", "nella", "nelle", "nello", "no", "non", "nostro", "nostra", "nostri", "nostre", "o",
        "ogni", "oltre", "onde", "ora", "oppure", "per", "perchè", "perché", "perciò", "perfino",
        "persino", "più", "pochi", "poche", "poi", "proprio", "quale", "quali", "quanto",
        "quanti", "quanta", "quante", "quel", "quello", "quella", "quelli", "quelle", "questo",
        "questa", "questi", "queste", "qui", "quindi", "restando", "se", "sempre", "senza", "si",
        "siamo", "siete", "sono", "sopra", "sotto", "sta", "stai", "stando", "stanno", "starai",
        "sarà", "stato", "stata", "stati", "state", "stessa", "stesse", "stesso", "stessi", "su",
        "suo", "sua", "suoi", "sue", "tale", "tali", "tanto", "tanti", "tanta", "tante", "ti",
        "tra", "tu", "tua", "tuo", "tuoi", "tue", "tuttavia", "tutto", "tutta", "tutti", "tutte",
        "un", "una", "uno", "verso", "voi", "vostri", "vostre", "vostro", "vostra", "è",
    ]
    .into_iter()
    .collect()
});

/// Lowercased query tokens with punctuation and stopwords removed
fn keywords(query: &str) -> HashSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.chars().filter(|c| !c.is_ascii_punctuation()).collect::<String>())
        .filter(|token| !token.is_empty() && !STOPWORDS.contains(token.as_str()))
        .collect()
}

/// Score every line under `root` by how many keywords it contains
///
/// Returns the best hits as `path:line: text`, highest score first, earlier
/// lines first among equal scores.
pub fn search_docs(root: &Path, query: &str) -> Result<Vec<String>, String> {
    let keywords = keywords(query);
    debug!(?keywords, "Documentation keywords");
    if keywords.is_empty() {
        return Err("No matches found (empty query or only stopwords).".to_string());
    }
    if !root.is_dir() {
        return Err(format!(
            "Documentation directory not found: {}",
            root.display()
        ));
    }

    let mut scored: Vec<(usize, usize, String)> = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Skipping unreadable doc");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        for (idx, line) in text.lines().enumerate() {
            let lower = line.to_lowercase();
            let score = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            if score > 0 {
                let snippet: String = line.trim().chars().take(MAX_LINE_CHARS).collect();
                scored.push((
                    score,
                    idx,
                    format!("{}:{}: {}", entry.path().display(), idx + 1, snippet),
                ));
            }
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    Ok(scored.into_iter().take(MAX_HITS).map(|(_, _, line)| line).collect())
}

/// Tool for consulting the bundled documentation
pub struct DocsTool;

#[async_trait]
impl Tool for DocsTool {
    fn kind(&self) -> ActionKind {
        ActionKind::ConsultDocumentation
    }

    fn description(&self) -> &str {
        "Searches the local language documentation for lines matching the query keywords."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "query",
            ParameterProperty::string("Keywords describing the topic"),
        )
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<QueryArgs>(self.kind(), args).map(|_| ())
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: QueryArgs = args::parse(self.kind(), args)?;
        let root = ctx.resolve(&ctx.paths.docs_dir);

        let hits = tokio::task::spawn_blocking(move || search_docs(&root, &args.query)).await?;
        match hits {
            Ok(hits) if hits.is_empty() => Ok(ToolResult::success(NO_DOC_MATCHES)),
            Ok(hits) => Ok(ToolResult::success(hits.join("\n")).with_matches(hits.len())),
            Err(e) => Ok(ToolResult::error(e)),
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

    #[test]
    fn test_keywords_drop_stopwords_and_punctuation() {
        let k = keywords("Come si fa una lista, in Python?");
        assert!(k.contains("lista"));
        assert!(k.contains("python"));
        assert!(!k.contains("come"));
        assert!(!k.contains("una"));
        assert_eq!(k.len(), 2);
    }

    #[test]
    fn test_ranking() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("python.md"),
            "intro\nuna lista si crea con []\nlista python: list()\n",
        )
        .unwrap();

        let hits = search_docs(dir.path(), "lista python").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].ends_with(":3: lista python: list()"));
        assert!(hits[1].contains(":2: "));
    }

    #[test]
    fn test_only_stopwords() {
        let dir = TempDir::new().unwrap();
        assert!(search_docs(dir.path(), "come si fa").is_err());
    }

    #[tokio::test]
    async fn test_tool_uses_configured_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("language_docs")).unwrap();
        std::fs::write(dir.path().join("language_docs/rust.md"), "Vec::new crea un vettore\n").unwrap();

        let ctx = ToolContext::new(dir.path().to_path_buf())
            .with_paths(Arc::new(PathsConfig::default()));
        let result = DocsTool
            .execute(&json!({"query": "vettore"}), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("rust.md:1: Vec::new crea un vettore"));

        let result = DocsTool
            .execute(&json!({"query": "goroutine"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, NO_DOC_MATCHES);
    }
}
