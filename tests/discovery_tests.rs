mod common;

use common::{create_workspace, instruction, write_task};
use std::fs;

use warifuri::engine::{
    discover_all_projects, discover_all_projects_safe, find_task_by_name, DiscoveryError,
};
use warifuri::workspace::{find_workspace_root, TaskStatus, TaskType};

#[test]
fn test_empty_workspace_discovers_nothing() {
    let workspace = create_workspace();

    let projects = discover_all_projects(workspace.path()).unwrap();
    assert!(projects.is_empty());
}

#[test]
fn test_discovers_projects_and_tasks() {
    let workspace = create_workspace();
    write_task(
        workspace.path(),
        "demo",
        "a",
        &instruction("a", &[], &[], &[]),
    );
    write_task(
        workspace.path(),
        "demo",
        "b",
        &instruction("b", &["a"], &[], &[]),
    );
    write_task(
        workspace.path(),
        "other",
        "x",
        &instruction("x", &[], &[], &[]),
    );

    let projects = discover_all_projects(workspace.path()).unwrap();
    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].name, "demo");
    assert_eq!(projects[0].tasks.len(), 2);
    assert_eq!(projects[1].name, "other");
}

#[test]
fn test_classification_by_file_presence() {
    let workspace = create_workspace();
    let machine = write_task(
        workspace.path(),
        "demo",
        "machine",
        &instruction("machine", &[], &[], &[]),
    );
    fs::write(machine.join("run.sh"), "#!/bin/bash\n").unwrap();
    let ai = write_task(
        workspace.path(),
        "demo",
        "ai",
        &instruction("ai", &[], &[], &[]),
    );
    fs::write(ai.join("prompt.yaml"), "model: gpt-4\n").unwrap();
    write_task(
        workspace.path(),
        "demo",
        "human",
        &instruction("human", &[], &[], &[]),
    );

    let projects = discover_all_projects(workspace.path()).unwrap();
    let tasks = &projects[0].tasks;
    assert_eq!(
        find_task_by_name(&projects, "demo", "machine").unwrap().task_type,
        TaskType::Machine
    );
    assert_eq!(
        find_task_by_name(&projects, "demo", "ai").unwrap().task_type,
        TaskType::Ai
    );
    assert_eq!(
        find_task_by_name(&projects, "demo", "human").unwrap().task_type,
        TaskType::Human
    );
    assert_eq!(tasks.len(), 3);
}

#[test]
fn test_done_marker_means_completed() {
    let workspace = create_workspace();
    let task_dir = write_task(
        workspace.path(),
        "demo",
        "a",
        &instruction("a", &[], &[], &[]),
    );
    fs::write(task_dir.join("done.md"), "2024-01-01 SHA: abc").unwrap();

    let projects = discover_all_projects(workspace.path()).unwrap();
    assert_eq!(projects[0].tasks[0].status, TaskStatus::Completed);
}

#[test]
fn test_strict_discovery_raises_on_malformed_instruction() {
    let workspace = create_workspace();
    write_task(workspace.path(), "demo", "bad", "name: [unclosed\n");

    assert!(discover_all_projects(workspace.path()).is_err());
}

#[test]
fn test_safe_discovery_skips_malformed_instruction() {
    let workspace = create_workspace();
    write_task(
        workspace.path(),
        "demo",
        "good",
        &instruction("good", &[], &[], &[]),
    );
    write_task(workspace.path(), "demo", "bad", "name: [unclosed\n");

    let (projects, errors) = discover_all_projects_safe(workspace.path());
    assert_eq!(projects[0].tasks.len(), 1);
    assert_eq!(projects[0].tasks[0].name, "good");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], DiscoveryError::Instruction(_)));
}

#[test]
fn test_empty_instruction_document_is_malformed() {
    let workspace = create_workspace();
    write_task(workspace.path(), "demo", "empty", "");

    let (projects, errors) = discover_all_projects_safe(workspace.path());
    assert!(projects[0].tasks.is_empty());
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_circular_dependency_is_a_hard_error() {
    let workspace = create_workspace();
    write_task(
        workspace.path(),
        "demo",
        "a",
        &instruction("a", &["b"], &[], &[]),
    );
    write_task(
        workspace.path(),
        "demo",
        "b",
        &instruction("b", &["a"], &[], &[]),
    );

    let err = discover_all_projects(workspace.path()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Circular dependency"));
    assert!(message.contains("demo/a"));
    assert!(message.contains("demo/b"));
}

#[test]
fn test_workspace_root_discovery_from_task_dir() {
    let workspace = create_workspace();
    let task_dir = write_task(
        workspace.path(),
        "demo",
        "a",
        &instruction("a", &[], &[], &[]),
    );

    let found = find_workspace_root(Some(&task_dir)).unwrap();
    assert_eq!(found, workspace.path());
}
