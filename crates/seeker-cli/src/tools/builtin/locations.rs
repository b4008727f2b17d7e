//! Well-known user folders used by file opening and search

use std::path::{Path, PathBuf};

const FOLDERS: [&str; 3] = ["Documents", "Desktop", "Downloads"];
const ONEDRIVE_VARS: [&str; 3] = ["OneDrive", "OneDriveConsumer", "OneDriveCommercial"];

/// Documents, Desktop and Downloads under the profile and any OneDrive roots
fn candidate_folders() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(profile) = std::env::var_os("USERPROFILE")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
    {
        roots.push(profile);
    }
    roots.extend(
        ONEDRIVE_VARS
            .iter()
            .filter_map(|var| std::env::var_os(var).map(PathBuf::from)),
    );

    let mut candidates: Vec<PathBuf> = roots
        .iter()
        .flat_map(|root| FOLDERS.iter().map(move |folder| root.join(folder)))
        .collect();
    // Localized folder names, e.g. "Documenti"
    candidates.extend(
        [dirs::document_dir(), dirs::desktop_dir(), dirs::download_dir()]
            .into_iter()
            .flatten(),
    );
    candidates
}

/// Keep existing directories matching the location hint, deduplicated
///
/// An unknown or missing hint keeps every existing folder.
pub fn narrow_locations(candidates: Vec<PathBuf>, hint: Option<&str>) -> Vec<PathBuf> {
    let mut existing: Vec<PathBuf> = Vec::new();
    for path in candidates {
        if path.is_dir() && !existing.contains(&path) {
            existing.push(path);
        }
    }

    let Some(hint) = hint.map(|h| h.to_lowercase()) else {
        return existing;
    };
    let wanted: &[&str] = if hint.contains("document") {
        &["documents", "documenti"]
    } else if hint.contains("desktop") || hint.contains("scrivania") {
        &["desktop", "scrivania"]
    } else if hint.contains("download") {
        &["downloads", "download"]
    } else {
        return existing;
    };

    existing
        .into_iter()
        .filter(|p| folder_name(p).map(|n| wanted.contains(&n.as_str())).unwrap_or(false))
        .collect()
}

fn folder_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

/// Existing user folders narrowed by an optional hint
pub fn resolve_search_locations(hint: Option<&str>) -> Vec<PathBuf> {
    narrow_locations(candidate_folders(), hint)
}
