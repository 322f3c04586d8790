//! Task, Project, and status types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::instruction::TaskInstruction;

/// Completion marker file. Presence is the sole source of truth for
/// completion; content is informational only.
pub const DONE_FILE: &str = "done.md";

/// Lock file held around the execute-publish sequence.
pub const EXECUTION_LOCK_FILE: &str = ".execution.lock";

/// How a task is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Machine,
    Ai,
    Human,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Machine => "machine",
            TaskType::Ai => "ai",
            TaskType::Human => "human",
        }
    }

    /// Classify a task directory by file presence, in priority order:
    /// a `run.sh` or `run.py` script makes it a machine task, a
    /// `prompt.yaml` makes it an AI task, anything else is human.
    pub fn classify(task_dir: &Path) -> TaskType {
        if task_dir.join("run.sh").exists() || task_dir.join("run.py").exists() {
            TaskType::Machine
        } else if task_dir.join("prompt.yaml").exists() {
            TaskType::Ai
        } else {
            TaskType::Human
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ready,
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory task entity, one per task directory.
#[derive(Debug, Clone)]
pub struct Task {
    pub project: String,
    pub name: String,
    /// Absolute path to the task directory.
    pub path: PathBuf,
    pub instruction: TaskInstruction,
    pub task_type: TaskType,
    pub status: TaskStatus,
}

impl Task {
    /// Unique identifier within the workspace: `project/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }

    /// Completion is re-read from disk so concurrent runners are observed.
    pub fn is_completed(&self) -> bool {
        self.done_path().exists()
    }

    pub fn done_path(&self) -> PathBuf {
        self.path.join(DONE_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.path.join("logs")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(EXECUTION_LOCK_FILE)
    }
}

/// Named collection of tasks plus its directory path.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub tasks: Vec<Task>,
}

impl Project {
    pub fn get_task(&self, task_name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == task_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn make_task(dir: &Path) -> Task {
        Task {
            project: "demo".to_string(),
            name: "build".to_string(),
            path: dir.to_path_buf(),
            instruction: TaskInstruction {
                name: "build".to_string(),
                description: "Build".to_string(),
                dependencies: vec![],
                inputs: vec![],
                outputs: vec![],
                note: None,
                task_type: None,
                auto_merge: None,
            },
            task_type: TaskType::Human,
            status: TaskStatus::Ready,
        }
    }

    #[test]
    fn test_full_name() {
        let dir = tempdir().unwrap();
        assert_eq!(make_task(dir.path()).full_name(), "demo/build");
    }

    #[test]
    fn test_is_completed_tracks_done_file() {
        let dir = tempdir().unwrap();
        let task = make_task(dir.path());

        assert!(!task.is_completed());
        fs::write(task.done_path(), "2024-01-01 SHA: abc").unwrap();
        assert!(task.is_completed());
    }

    #[test]
    fn test_classify_machine_shell() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("run.sh"), "#!/bin/bash\n").unwrap();
        assert_eq!(TaskType::classify(dir.path()), TaskType::Machine);
    }

    #[test]
    fn test_classify_machine_python() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("run.py"), "print('x')\n").unwrap();
        assert_eq!(TaskType::classify(dir.path()), TaskType::Machine);
    }

    #[test]
    fn test_classify_machine_wins_over_ai() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("run.sh"), "").unwrap();
        fs::write(dir.path().join("prompt.yaml"), "model: gpt-4\n").unwrap();
        assert_eq!(TaskType::classify(dir.path()), TaskType::Machine);
    }

    #[test]
    fn test_classify_ai() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("prompt.yaml"), "model: gpt-4\n").unwrap();
        assert_eq!(TaskType::classify(dir.path()), TaskType::Ai);
    }

    #[test]
    fn test_classify_human_default() {
        let dir = tempdir().unwrap();
        assert_eq!(TaskType::classify(dir.path()), TaskType::Human);
    }

    #[test]
    fn test_project_get_task() {
        let dir = tempdir().unwrap();
        let project = Project {
            name: "demo".to_string(),
            path: dir.path().to_path_buf(),
            tasks: vec![make_task(dir.path())],
        };

        assert!(project.get_task("build").is_some());
        assert!(project.get_task("missing").is_none());
    }
}
