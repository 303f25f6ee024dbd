//! Project identity for activity attribution.
//!
//! Walks up from an edited file to the nearest project marker and derives a
//! stable repo identifier from the marker path, so the same project hashes
//! to the same identity across windows and restarts. Detection is
//! intentionally conservative: an unattributable file falls back to a
//! placeholder project rather than guessing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maximum depth to walk up when searching for markers.
/// Prevents runaway traversal in deeply nested or misconfigured paths.
const MAX_MARKER_DEPTH: usize = 20;

/// Project markers in priority order; first match at a level wins.
const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
];

/// Name + root + stable identifier of the project a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub name: String,
    pub directory: String,
    /// md5 of the canonical marker path; stable across windows and restarts.
    pub identifier: String,
}

impl ProjectIdentity {
    /// Placeholder used when no file in the session could be attributed.
    pub fn unnamed() -> Self {
        ProjectIdentity {
            name: "Unnamed".to_string(),
            directory: "Untitled".to_string(),
            identifier: format!("{:x}", md5::compute("Untitled")),
        }
    }
}

/// Resolves the project identity for a file path, or `None` when no marker
/// is found within the depth limit.
pub fn resolve_project(file_path: &str) -> Option<ProjectIdentity> {
    let path = Path::new(file_path);
    if !path.exists() {
        return None;
    }

    let start = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    let home_dir = dirs::home_dir();
    let mut current = Some(start);
    let mut depth = 0;

    while let Some(dir) = current {
        if depth >= MAX_MARKER_DEPTH {
            break;
        }

        for marker in PROJECT_MARKERS {
            if dir.join(marker).exists() {
                let canonical = canonicalize_path(&dir);
                let marker_path = canonicalize_path(&dir.join(marker));
                let name = canonical
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Unnamed".to_string());
                return Some(ProjectIdentity {
                    name,
                    directory: canonical.to_string_lossy().to_string(),
                    identifier: format!("{:x}", md5::compute(marker_path.to_string_lossy().as_bytes())),
                });
            }
        }

        // Stop at home directory
        if let Some(ref home) = home_dir {
            if dir == *home {
                break;
            }
        }

        current = dir.parent().map(|p| p.to_path_buf());
        depth += 1;
    }

    None
}

fn canonicalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
