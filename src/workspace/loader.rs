//! Workspace filesystem access and YAML loading
//!
//! The workspace root is found by walking upward from a start directory: a
//! directory with a `workspace/` child yields that child, a directory with a
//! `projects/` child yields itself. First match wins.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde_yaml::{Mapping, Value};

use super::instruction::InstructionError;

/// Subdirectory of the workspace holding one directory per project.
pub const PROJECTS_DIR: &str = "projects";

/// Per-task instruction file name.
pub const INSTRUCTION_FILE: &str = "instruction.yaml";

/// Walk upward from `start` (or the current directory) looking for a
/// workspace. Returns `None` when no ancestor qualifies.
pub fn find_workspace_root(start: Option<&Path>) -> Option<PathBuf> {
    let start = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().ok()?,
    };

    let mut current = Some(start.as_path());
    while let Some(dir) = current {
        let nested = dir.join("workspace");
        if nested.is_dir() {
            return Some(nested);
        }
        if dir.join(PROJECTS_DIR).is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Immediate subdirectories of `projects/`, dot-prefixed names excluded,
/// sorted for deterministic iteration.
pub fn list_projects(workspace: &Path) -> Vec<String> {
    list_subdirectories(&workspace.join(PROJECTS_DIR))
}

/// Task directories beneath a project, same rules as `list_projects`.
pub fn list_tasks(workspace: &Path, project: &str) -> Vec<String> {
    list_subdirectories(&workspace.join(PROJECTS_DIR).join(project))
}

fn list_subdirectories(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// All `instruction.yaml` files under `projects/`, recursively.
pub fn find_instruction_files(workspace: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_instruction_files(&workspace.join(PROJECTS_DIR), &mut found);
    found.sort();
    found
}

fn collect_instruction_files(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_instruction_files(&path, found);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(INSTRUCTION_FILE) {
            found.push(path);
        }
    }
}

/// Load a YAML file as a mapping. An empty or null document parses to an
/// empty mapping; anything that is not a mapping is malformed.
pub fn load_yaml(path: &Path) -> Result<Mapping, InstructionError> {
    let content = fs::read_to_string(path)
        .map_err(|_| InstructionError::Missing(path.to_path_buf()))?;

    let value: Value =
        serde_yaml::from_str(&content).map_err(|source| InstructionError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(InstructionError::Malformed {
            path: path.to_path_buf(),
            source: serde_yaml::Error::custom("expected a YAML mapping"),
        }),
    }
}
