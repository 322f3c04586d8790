//! Readiness evaluation
//!
//! The single source of truth for whether a task may run now: not already
//! completed, every dependency resolved and completed, every declared input
//! present on disk at its resolved path. Side-effect-free on the filesystem;
//! `find_ready_tasks` refreshes the in-memory statuses.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use super::paths::resolve_input_path;
use super::task_graph::{resolve_dependency, TaskGraph};
use crate::workspace::loader::PROJECTS_DIR;
use crate::workspace::{Project, Task, TaskStatus};

/// Evaluate a single task against the current filesystem state.
pub fn evaluate_task(
    task: &Task,
    tasks_by_name: &HashMap<String, &Task>,
    projects_base: &Path,
) -> TaskStatus {
    if task.is_completed() {
        return TaskStatus::Completed;
    }

    for dep in &task.instruction.dependencies {
        let full_name = resolve_dependency(dep, &task.project);
        match tasks_by_name.get(&full_name) {
            Some(dep_task) if dep_task.is_completed() => {}
            Some(_) => {
                debug!(task = %task.full_name(), dependency = %full_name, "dependency not completed");
                return TaskStatus::Pending;
            }
            None => {
                debug!(task = %task.full_name(), dependency = %full_name, "unresolved dependency");
                return TaskStatus::Pending;
            }
        }
    }

    for input in &task.instruction.inputs {
        match resolve_input_path(input, &task.path, projects_base) {
            Ok(resolved) if resolved.path.exists() => {}
            Ok(resolved) => {
                debug!(task = %task.full_name(), input, path = %resolved.path.display(), "input not materialised");
                return TaskStatus::Pending;
            }
            Err(reason) => {
                debug!(task = %task.full_name(), input, reason, "input reference rejected");
                return TaskStatus::Pending;
            }
        }
    }

    TaskStatus::Ready
}

/// Re-evaluate every task, update statuses in place, and return the ready
/// set in an order consistent with the dependency graph (predecessors before
/// successors, ties broken by `full_name`).
pub fn find_ready_tasks(projects: &mut [Project], workspace: &Path) -> Vec<Task> {
    let projects_base = workspace.join(PROJECTS_DIR);

    let snapshot: Vec<Task> = projects
        .iter()
        .flat_map(|p| p.tasks.iter().cloned())
        .collect();
    let by_name: HashMap<String, &Task> =
        snapshot.iter().map(|t| (t.full_name(), t)).collect();

    let mut statuses: HashMap<String, TaskStatus> = HashMap::new();
    for task in &snapshot {
        statuses.insert(task.full_name(), evaluate_task(task, &by_name, &projects_base));
    }

    for project in projects.iter_mut() {
        for task in project.tasks.iter_mut() {
            if let Some(status) = statuses.get(&task.full_name()) {
                task.status = *status;
            }
        }
    }

    let graph = TaskGraph::build(&snapshot);
    let order = graph.topological_order();
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let mut ready: Vec<Task> = snapshot
        .into_iter()
        .filter(|t| statuses.get(&t.full_name()) == Some(&TaskStatus::Ready))
        .map(|mut t| {
            t.status = TaskStatus::Ready;
            t
        })
        .collect();
    ready.sort_by_key(|t| {
        position
            .get(t.full_name().as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
    ready
}
