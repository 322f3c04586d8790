//! Task and project discovery
//!
//! Walks the workspace, parses instruction files, classifies each task, and
//! verifies the dependency graph is acyclic. Two modes: strict functions
//! raise on the first structural error; `_safe` variants return partial
//! results plus the errors encountered.

use std::path::Path;

use tracing::{debug, warn};

use super::task_graph::{GraphError, TaskGraph};
use crate::workspace::loader::{list_projects, list_tasks, INSTRUCTION_FILE, PROJECTS_DIR};
use crate::workspace::{Project, Task, TaskInstruction, TaskStatus, TaskType};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Instruction(#[from] crate::workspace::InstructionError),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Load a single task directory. Status is provisional here: completed if
/// `done.md` exists, ready otherwise. Readiness evaluation refines it.
pub fn discover_task(project: &str, task_dir: &Path) -> Result<Task, DiscoveryError> {
    let instruction = TaskInstruction::load(&task_dir.join(INSTRUCTION_FILE))?;
    let task_type = TaskType::classify(task_dir);

    let name = task_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(instruction.name.as_str())
        .to_string();

    let status = if task_dir.join(crate::workspace::DONE_FILE).exists() {
        TaskStatus::Completed
    } else {
        TaskStatus::Ready
    };

    debug!(project, task = %name, task_type = %task_type, "discovered task");

    Ok(Task {
        project: project.to_string(),
        name,
        path: task_dir.to_path_buf(),
        instruction,
        task_type,
        status,
    })
}

/// Load a project, raising on the first task that fails to parse.
pub fn discover_project(workspace: &Path, project_name: &str) -> Result<Project, DiscoveryError> {
    let project_path = workspace.join(PROJECTS_DIR).join(project_name);
    if !project_path.is_dir() {
        return Err(DiscoveryError::ProjectNotFound(project_name.to_string()));
    }

    let mut tasks = Vec::new();
    for task_name in list_tasks(workspace, project_name) {
        tasks.push(discover_task(project_name, &project_path.join(&task_name))?);
    }

    Ok(Project {
        name: project_name.to_string(),
        path: project_path,
        tasks,
    })
}

/// Load a project tolerantly: tasks that fail to parse are logged, skipped,
/// and reported in the error list.
pub fn discover_project_safe(
    workspace: &Path,
    project_name: &str,
) -> (Option<Project>, Vec<DiscoveryError>) {
    let project_path = workspace.join(PROJECTS_DIR).join(project_name);
    if !project_path.is_dir() {
        return (
            None,
            vec![DiscoveryError::ProjectNotFound(project_name.to_string())],
        );
    }

    let mut tasks = Vec::new();
    let mut errors = Vec::new();
    for task_name in list_tasks(workspace, project_name) {
        match discover_task(project_name, &project_path.join(&task_name)) {
            Ok(task) => tasks.push(task),
            Err(err) => {
                warn!(project = project_name, task = %task_name, error = %err, "skipping task");
                errors.push(err);
            }
        }
    }

    (
        Some(Project {
            name: project_name.to_string(),
            path: project_path,
            tasks,
        }),
        errors,
    )
}

/// Load every project strictly, then verify the workspace-wide dependency
/// graph is acyclic.
pub fn discover_all_projects(workspace: &Path) -> Result<Vec<Project>, DiscoveryError> {
    let mut projects = Vec::new();
    for project_name in list_projects(workspace) {
        projects.push(discover_project(workspace, &project_name)?);
    }

    let all_tasks: Vec<Task> = projects
        .iter()
        .flat_map(|p| p.tasks.iter().cloned())
        .collect();
    TaskGraph::build(&all_tasks).detect_cycle()?;

    Ok(projects)
}

/// Tolerant variant of [`discover_all_projects`]: partial results plus every
/// error encountered, including a cycle if one exists among the tasks that
/// did load.
pub fn discover_all_projects_safe(workspace: &Path) -> (Vec<Project>, Vec<DiscoveryError>) {
    let mut projects = Vec::new();
    let mut errors = Vec::new();

    for project_name in list_projects(workspace) {
        let (project, mut project_errors) = discover_project_safe(workspace, &project_name);
        errors.append(&mut project_errors);
        if let Some(project) = project {
            projects.push(project);
        }
    }

    let all_tasks: Vec<Task> = projects
        .iter()
        .flat_map(|p| p.tasks.iter().cloned())
        .collect();
    if let Err(err) = TaskGraph::build(&all_tasks).detect_cycle() {
        errors.push(DiscoveryError::Graph(err));
    }

    (projects, errors)
}

/// Look up a task by project and task name.
pub fn find_task_by_name<'a>(
    projects: &'a [Project],
    project_name: &str,
    task_name: &str,
) -> Option<&'a Task> {
    projects
        .iter()
        .find(|p| p.name == project_name)
        .and_then(|p| p.get_task(task_name))
}
