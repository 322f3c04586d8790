//! Secure input path resolution
//!
//! Every declared input reference funnels through [`resolve_input_path`].
//! Its containment check against the resolved `projects/` base is the only
//! defence against references escaping the workspace; the `..`-segment count
//! is a cheap pre-filter, not the authority.

use std::io;
use std::path::{Component, Path, PathBuf};

/// References with more `..` segments than this are rejected outright.
pub const MAX_PARENT_SEGMENTS: usize = 10;

/// A reference accepted by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Absolute path, guaranteed to lie inside the `projects/` subtree.
    pub path: PathBuf,
    /// Human-readable diagnostic describing how the reference resolved.
    pub detail: String,
    /// True when the path lies outside the owning task directory (but still
    /// inside `projects/`).
    pub cross_project: bool,
}

/// Resolve `reference` against the owning task directory. Returns the
/// resolved path on acceptance or the rejection reason. Deterministic and
/// pure modulo filesystem state.
pub fn resolve_input_path(
    reference: &str,
    task_dir: &Path,
    projects_base: &Path,
) -> Result<ResolvedInput, String> {
    let parent_segments = Path::new(reference)
        .components()
        .filter(|component| matches!(component, Component::ParentDir))
        .count();
    if parent_segments > MAX_PARENT_SEGMENTS {
        return Err(format!(
            "excessive path traversal detected in '{}'",
            reference
        ));
    }

    let base = projects_base
        .canonicalize()
        .map_err(|err| format!("projects directory not resolvable: {}", err))?;
    let task_dir_real = task_dir
        .canonicalize()
        .map_err(|err| format!("task directory not resolvable: {}", err))?;

    let resolved = resolve_best_effort(&task_dir_real.join(reference))
        .map_err(|err| format!("could not resolve '{}': {}", reference, err))?;

    if !resolved.starts_with(&base) {
        return Err(format!(
            "path traversal outside projects directory: '{}'",
            reference
        ));
    }

    let cross_project = !resolved.starts_with(&task_dir_real);
    let detail = if cross_project {
        format!(
            "resolved cross-project input '{}' -> {}",
            reference,
            resolved.display()
        )
    } else {
        format!(
            "resolved task-local input '{}' -> {}",
            reference,
            resolved.display()
        )
    };

    Ok(ResolvedInput {
        path: resolved,
        detail,
        cross_project,
    })
}

/// Fully resolve a path: symlinks and dot segments when it exists, otherwise
/// canonicalize the deepest existing ancestor and append the remaining
/// lexically-normalised components. Keeps containment checks honest for
/// paths that have not been materialised yet.
fn resolve_best_effort(path: &Path) -> io::Result<PathBuf> {
    if let Ok(real) = path.canonicalize() {
        return Ok(real);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    let mut existing = normalized.clone();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
