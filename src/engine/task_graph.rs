//! Task dependency graph
//!
//! One vertex per task, identified by `full_name`. Edges encode "task X
//! depends on task D". Cycle detection is an iterative depth-first search
//! with three-colour marking; vertices are visited in lexicographic order so
//! error messages are stable across runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::workspace::Task;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Resolve a dependency string against the owning project: a string
/// containing `/` is already a full name, anything else is a task in the
/// same project.
pub fn resolve_dependency(reference: &str, project: &str) -> String {
    if reference.contains('/') {
        reference.to_string()
    } else {
        format!("{}/{}", project, reference)
    }
}

/// Dependency adjacency keyed by `full_name`. Unresolved references are kept
/// as-is; they are ignored by traversal and surface later in readiness
/// evaluation and `validate`.
#[derive(Debug, Default)]
pub struct TaskGraph {
    dependencies: BTreeMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn build(tasks: &[Task]) -> Self {
        let mut dependencies = BTreeMap::new();
        for task in tasks {
            let deps = task
                .instruction
                .dependencies
                .iter()
                .map(|dep| resolve_dependency(dep, &task.project))
                .collect();
            dependencies.insert(task.full_name(), deps);
        }
        Self { dependencies }
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.dependencies.contains_key(full_name)
    }

    /// Resolved dependencies of a vertex (may include unknown names).
    pub fn dependencies_of(&self, full_name: &str) -> &[String] {
        self.dependencies
            .get(full_name)
            .map(|deps| deps.as_slice())
            .unwrap_or(&[])
    }

    /// Dependency references that do not resolve to a known vertex, as
    /// `(task, missing dependency)` pairs in deterministic order.
    pub fn unresolved_references(&self) -> Vec<(String, String)> {
        let mut unresolved = Vec::new();
        for (name, deps) in &self.dependencies {
            for dep in deps {
                if !self.dependencies.contains_key(dep) {
                    unresolved.push((name.clone(), dep.clone()));
                }
            }
        }
        unresolved
    }

    /// Report the first cycle found, as the sequence of on-stack vertices
    /// from the re-encountered vertex to the current one, closed with the
    /// repeated vertex.
    pub fn detect_cycle(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = self
            .dependencies
            .keys()
            .map(|name| (name.as_str(), Mark::Unvisited))
            .collect();

        for start in self.dependencies.keys() {
            if marks[start.as_str()] != Mark::Unvisited {
                continue;
            }

            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::OnStack);

            while let Some(frame) = stack.last_mut() {
                let (node, next_edge) = (frame.0, frame.1);
                let deps = self.dependencies_of(node);

                if next_edge < deps.len() {
                    frame.1 += 1;
                    let dep = deps[next_edge].as_str();
                    match marks.get(dep).copied() {
                        // Unknown vertex: unresolved reference, not a cycle.
                        None => {}
                        Some(Mark::Unvisited) => {
                            marks.insert(dep, Mark::OnStack);
                            stack.push((dep, 0));
                        }
                        Some(Mark::OnStack) => {
                            let from = stack
                                .iter()
                                .position(|(name, _)| *name == dep)
                                .unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[from..].iter().map(|(name, _)| name.to_string()).collect();
                            cycle.push(dep.to_string());
                            return Err(GraphError::CircularDependency { cycle });
                        }
                        Some(Mark::Done) => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }

        Ok(())
    }

    /// Deterministic topological order: dependency predecessors before
    /// successors, ties broken lexicographically by `full_name`. On a cyclic
    /// graph the vertices stuck in the cycle are appended in lexicographic
    /// order; `detect_cycle` is the authority for rejecting those.
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, deps) in &self.dependencies {
            in_degree.entry(name.as_str()).or_insert(0);
            for dep in deps {
                if self.dependencies.contains_key(dep) {
                    *in_degree.entry(name.as_str()).or_insert(0) += 1;
                    dependents.entry(dep.as_str()).or_default().push(name.as_str());
                }
            }
        }

        let mut frontier: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.dependencies.len());
        while let Some(name) = frontier.pop_first() {
            order.push(name.to_string());
            if let Some(next) = dependents.get(name) {
                for &dependent in next {
                    let degree = in_degree.entry(dependent).or_insert(0);
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        frontier.insert(dependent);
                    }
                }
            }
        }

        if order.len() < self.dependencies.len() {
            for name in self.dependencies.keys() {
                if !order.iter().any(|n| n == name) {
                    order.push(name.clone());
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::instruction::TaskInstruction;
    use crate::workspace::task::{TaskStatus, TaskType};
    use std::path::PathBuf;

    fn make_task(project: &str, name: &str, deps: Vec<&str>) -> Task {
        Task {
            project: project.to_string(),
            name: name.to_string(),
            path: PathBuf::from(format!("/ws/projects/{}/{}", project, name)),
            instruction: TaskInstruction {
                name: name.to_string(),
                description: format!("{} task", name),
                dependencies: deps.into_iter().map(String::from).collect(),
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
    fn test_resolve_dependency() {
        assert_eq!(resolve_dependency("build", "demo"), "demo/build");
        assert_eq!(resolve_dependency("other/build", "demo"), "other/build");
    }

    #[test]
    fn test_simple_chain_order() {
        let tasks = vec![
            make_task("demo", "c", vec!["b"]),
            make_task("demo", "a", vec![]),
            make_task("demo", "b", vec!["a"]),
        ];

        let graph = TaskGraph::build(&tasks);
        assert!(graph.detect_cycle().is_ok());
        assert_eq!(
            graph.topological_order(),
            vec!["demo/a", "demo/b", "demo/c"]
        );
    }

    #[test]
    fn test_ties_broken_lexicographically() {
        let tasks = vec![
            make_task("demo", "zeta", vec![]),
            make_task("demo", "alpha", vec![]),
            make_task("demo", "final", vec!["alpha", "zeta"]),
        ];

        let graph = TaskGraph::build(&tasks);
        assert_eq!(
            graph.topological_order(),
            vec!["demo/alpha", "demo/zeta", "demo/final"]
        );
    }

    #[test]
    fn test_cross_project_dependency() {
        let tasks = vec![
            make_task("app", "deploy", vec!["lib/build"]),
            make_task("lib", "build", vec![]),
        ];

        let graph = TaskGraph::build(&tasks);
        assert!(graph.detect_cycle().is_ok());
        assert_eq!(graph.topological_order(), vec!["lib/build", "app/deploy"]);
    }

    #[test]
    fn test_two_task_cycle() {
        let tasks = vec![
            make_task("demo", "a", vec!["b"]),
            make_task("demo", "b", vec!["a"]),
        ];

        let graph = TaskGraph::build(&tasks);
        let err = graph.detect_cycle().unwrap_err();
        let GraphError::CircularDependency { cycle } = err;
        assert!(cycle.contains(&"demo/a".to_string()));
        assert!(cycle.contains(&"demo/b".to_string()));
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_self_cycle() {
        let tasks = vec![make_task("demo", "a", vec!["a"])];

        let graph = TaskGraph::build(&tasks);
        let GraphError::CircularDependency { cycle } = graph.detect_cycle().unwrap_err();
        assert_eq!(cycle, vec!["demo/a", "demo/a"]);
    }

    #[test]
    fn test_cycle_message_is_stable() {
        let tasks = vec![
            make_task("demo", "a", vec!["c"]),
            make_task("demo", "b", vec!["a"]),
            make_task("demo", "c", vec!["b"]),
        ];

        let graph = TaskGraph::build(&tasks);
        let first = graph.detect_cycle().unwrap_err().to_string();
        let second = TaskGraph::build(&tasks).detect_cycle().unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(first.starts_with("Circular dependency detected:"));
    }

    #[test]
    fn test_unresolved_reference_is_not_a_cycle() {
        let tasks = vec![make_task("demo", "a", vec!["ghost"])];

        let graph = TaskGraph::build(&tasks);
        assert!(graph.detect_cycle().is_ok());
        assert_eq!(
            graph.unresolved_references(),
            vec![("demo/a".to_string(), "demo/ghost".to_string())]
        );
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::build(&[]);
        assert!(graph.is_empty());
        assert!(graph.detect_cycle().is_ok());
        assert!(graph.topological_order().is_empty());
    }
}
