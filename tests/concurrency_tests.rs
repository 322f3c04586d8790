mod common;

use common::{create_workspace, instruction, write_script, write_task};
use std::fs;
use std::time::Duration;

use warifuri::engine::{
    discover_all_projects, find_task_by_name, ExecutionConfig, TaskExecutor,
};
use warifuri::fsops::{FileLock, LockError};

#[tokio::test]
async fn test_concurrent_runners_execute_once() {
    let workspace = create_workspace();
    let task_dir = write_task(
        workspace.path(),
        "demo",
        "singleton",
        &instruction("singleton", &[], &[], &["result.txt"]),
    );
    // The script records each invocation outside the staging directory, so
    // a double execution would leave two lines.
    write_script(
        &task_dir,
        "run.sh",
        r#"#!/bin/bash
sleep 1
echo "ran" >> "$WARIFURI_WORKSPACE_DIR/invocations.txt"
echo "done" > result.txt
"#,
    );

    let projects = discover_all_projects(workspace.path()).unwrap();
    let task = find_task_by_name(&projects, "demo", "singleton").unwrap().clone();

    let first = TaskExecutor::new(workspace.path());
    let second = TaskExecutor::new(workspace.path());
    let (a, b) = tokio::join!(first.execute(&task), second.execute(&task));

    // One runner wins, the other observes done.md and succeeds without
    // re-executing.
    a.unwrap();
    b.unwrap();

    let canonical_workspace = workspace.path().canonicalize().unwrap();
    let invocations = fs::read_to_string(canonical_workspace.join("invocations.txt")).unwrap();
    assert_eq!(invocations.lines().count(), 1);
    assert!(task_dir.join("done.md").exists());
    assert!(!task_dir.join(".execution.lock").exists());
}

#[tokio::test]
async fn test_held_lock_times_out_without_side_effects() {
    let workspace = create_workspace();
    let task_dir = write_task(
        workspace.path(),
        "demo",
        "locked",
        &instruction("locked", &[], &[], &["out.txt"]),
    );
    write_script(&task_dir, "run.sh", "#!/bin/bash\necho x > out.txt\n");

    let projects = discover_all_projects(workspace.path()).unwrap();
    let task = find_task_by_name(&projects, "demo", "locked").unwrap().clone();

    // Simulate a stuck runner holding the lock without ever completing.
    let _held = FileLock::acquire(&task_dir.join(".execution.lock"), Duration::from_secs(1))
        .unwrap();

    let config = ExecutionConfig {
        lock_timeout: Duration::from_millis(200),
        ..ExecutionConfig::default()
    };
    let result = TaskExecutor::with_config(workspace.path(), config)
        .execute(&task)
        .await;

    match result {
        Err(err) => assert_eq!(err.kind(), "LockHeld"),
        Ok(()) => panic!("expected LockHeld"),
    }
    assert!(!task_dir.join("out.txt").exists());
    assert!(!task_dir.join("done.md").exists());
    assert!(!task_dir.join("logs").exists());
}

#[tokio::test]
async fn test_lock_released_after_failed_run() {
    let workspace = create_workspace();
    let task_dir = write_task(
        workspace.path(),
        "demo",
        "crashy",
        &instruction("crashy", &[], &[], &[]),
    );
    write_script(&task_dir, "run.sh", "#!/bin/bash\nexit 1\n");

    let projects = discover_all_projects(workspace.path()).unwrap();
    let task = find_task_by_name(&projects, "demo", "crashy").unwrap().clone();

    let executor = TaskExecutor::new(workspace.path());
    assert!(executor.execute(&task).await.is_err());

    // The lock is released on the failure path too.
    assert!(!task_dir.join(".execution.lock").exists());
    let reacquire = FileLock::acquire(
        &task_dir.join(".execution.lock"),
        Duration::from_millis(100),
    );
    assert!(reacquire.is_ok());
}

#[test]
fn test_lock_error_reports_path() {
    let workspace = create_workspace();
    let lock_path = workspace.path().join("x.lock");
    let _held = FileLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();

    let err = FileLock::acquire(&lock_path, Duration::from_millis(100)).unwrap_err();
    match err {
        LockError::Timeout { path, .. } => assert_eq!(path, lock_path),
        other => panic!("unexpected error: {other:?}"),
    }
}
