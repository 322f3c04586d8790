//! On-disk workspace model
//!
//! A workspace holds `projects/<project>/<task>/` directories, each task
//! described by an `instruction.yaml`:
//! - `instruction` - the declarative task record
//! - `task` - Task, Project, and status/type enums
//! - `loader` - workspace-root discovery, listing, YAML loading

pub mod instruction;
pub mod loader;
pub mod task;

pub use instruction::{InstructionError, TaskInstruction};
pub use loader::{
    find_instruction_files, find_workspace_root, list_projects, list_tasks, load_yaml,
    INSTRUCTION_FILE, PROJECTS_DIR,
};
pub use task::{Project, Task, TaskStatus, TaskType, DONE_FILE, EXECUTION_LOCK_FILE};
