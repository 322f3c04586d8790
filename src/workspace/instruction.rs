//! Task instruction files
//!
//! `instruction.yaml` is the declarative record describing a task: what it
//! is, which tasks it depends on, and which files it consumes and produces.
//! Unknown keys are ignored for forward compatibility.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::task::TaskType;

#[derive(Debug, thiserror::Error)]
pub enum InstructionError {
    #[error("instruction file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("malformed instruction in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Declarative task record parsed from `instruction.yaml`.
///
/// `dependencies` entries are either bare task names (resolved within the
/// same project) or `project/task` full names. `inputs` and `outputs` are
/// workspace-relative path strings declaring the task's file contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstruction {
    pub name: String,

    pub description: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    /// Free-form remarks, surfaced by `show` and appended to AI prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Declared execution type. File presence (`run.sh`, `prompt.yaml`)
    /// remains authoritative for dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,

    /// Cooperative hint for the GitHub collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_merge: Option<bool>,
}

impl TaskInstruction {
    /// Load and parse an instruction file. An empty or null document is a
    /// valid YAML mapping but fails construction here (`name` is required).
    pub fn load(path: &Path) -> Result<Self, InstructionError> {
        let mapping = super::loader::load_yaml(path)?;
        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping)).map_err(|source| {
            InstructionError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}
