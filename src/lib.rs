//! # warifuri
//!
//! A workspace-oriented task orchestrator. Given a directory tree of
//! *projects*, each containing *tasks* described by `instruction.yaml`
//! files, warifuri discovers tasks, resolves the dependency graph between
//! them, decides which are ready to run, and executes them in a sandboxed
//! working directory.
//!
//! ## Concepts
//!
//! - **Workspace**: a directory containing `projects/`, found by walking
//!   upward from the current directory
//! - **Task**: `projects/<project>/<task>/`, identified by `project/task`
//! - **Task types**: machine (`run.sh`/`run.py`), AI (`prompt.yaml`),
//!   human (neither)
//! - **Completion**: the `done.md` marker file, written atomically and only
//!   after a successful run
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warifuri::engine::{discover_all_projects, find_ready_tasks, TaskExecutor};
//! use warifuri::workspace::find_workspace_root;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workspace = find_workspace_root(None).expect("no workspace found");
//!     let mut projects = discover_all_projects(&workspace)?;
//!
//!     if let Some(task) = find_ready_tasks(&mut projects, &workspace).first() {
//!         TaskExecutor::new(&workspace).execute(task).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod engine;
pub mod fsops;
pub mod github;
pub mod template;
pub mod workspace;

// Re-export main types
pub use engine::{
    discover_all_projects, discover_all_projects_safe, find_ready_tasks, find_task_by_name,
    DiscoveryError, ExecutionConfig, ExecutorError, GraphError, TaskExecutor, TaskGraph,
};
pub use workspace::{
    find_workspace_root, InstructionError, Project, Task, TaskInstruction, TaskStatus, TaskType,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        discover_all_projects, discover_all_projects_safe, evaluate_task, find_ready_tasks,
        find_task_by_name, resolve_input_path, DiscoveryError, ExecutionConfig, ExecutorError,
        GraphError, TaskExecutor, TaskGraph,
    };
    pub use crate::workspace::{
        find_workspace_root, list_projects, list_tasks, InstructionError, Project, Task,
        TaskInstruction, TaskStatus, TaskType,
    };
}
