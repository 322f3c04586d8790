//! Core orchestration engine
//!
//! - `discovery` - scan the workspace, parse instructions, classify tasks
//! - `task_graph` - dependency adjacency, cycle detection, topological order
//! - `readiness` - per-task dependency + input-file predicate
//! - `paths` - secure input path resolution
//! - `executor` - sandboxed machine execution, AI/human dispatch
//! - `completion` - `done.md` markers and success/failure logs
//! - `error` - executor error kinds

pub mod completion;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod paths;
pub mod readiness;
pub mod task_graph;

pub use completion::{git_commit_sha, log_failure, log_success, write_done_file, ExecutionReport};
pub use discovery::{
    discover_all_projects, discover_all_projects_safe, discover_project, discover_project_safe,
    discover_task, find_task_by_name, DiscoveryError,
};
pub use error::ExecutorError;
pub use executor::{ExecutionConfig, TaskExecutor};
pub use paths::{resolve_input_path, ResolvedInput, MAX_PARENT_SEGMENTS};
pub use readiness::{evaluate_task, find_ready_tasks};
pub use task_graph::{resolve_dependency, GraphError, TaskGraph};
