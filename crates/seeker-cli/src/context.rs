//! File context pulled into requests: `@path` mentions and `/init` scans

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Characters of a mentioned file inlined into the request
pub const MENTION_MAX_CHARS: usize = 12_000;

/// Entries listed by a directory scan
pub const SCAN_MAX_FILES: usize = 100;

const SCAN_EXCLUDE: &[&str] = &[".git", "target", "node_modules", "__pycache__"];

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z0-9_./-]+)").expect("valid mention regex"));

/// Request text with the mentioned files appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionExpansion {
    pub text: String,
    /// Mentions that resolved to readable files
    pub attached: Vec<String>,
}

/// Inline the content of every `@path` that names a readable file
///
/// Mentions that do not resolve are left as plain text.
pub fn expand_mentions(input: &str, working_dir: &Path) -> MentionExpansion {
    let mut text = input.to_string();
    let mut attached = Vec::new();

    for caps in MENTION.captures_iter(input) {
        let name = &caps[1];
        if attached.iter().any(|a| a == name) {
            continue;
        }
        let path = resolve(name, working_dir);
        if !path.is_file() {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                text.push_str(&format!(
                    "\n\n=== FILE CONTEXT: {} ===\n{}\n============================\n",
                    name,
                    truncate_chars(&content, MENTION_MAX_CHARS)
                ));
                debug!(file = %path.display(), "Attached mentioned file");
                attached.push(name.to_string());
            }
            Err(e) => warn!(file = %path.display(), error = %e, "Could not read mentioned file"),
        }
    }

    MentionExpansion { text, attached }
}

fn resolve(name: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn truncate_chars(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n...[TRUNCATED]", &content[..idx]),
        None => content.to_string(),
    }
}

/// List up to `limit` files under `root`, skipping build and VCS folders
pub fn scan_directory(root: &Path, limit: usize) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|name| SCAN_EXCLUDE.contains(&name))
                    .unwrap_or(false)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| e.path().to_path_buf())
        })
        .take(limit)
        .collect()
}

/// Notice attached to the next request after `/init`
pub fn init_notice(files: &[PathBuf]) -> String {
    let listing = files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "SYSTEM NOTICE: The user ran /init. Here is the file structure of the working directory:\n{}",
        listing
    )
}
