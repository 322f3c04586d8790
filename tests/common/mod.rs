use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn create_workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp workspace");
    fs::create_dir_all(dir.path().join("projects")).expect("Failed to create projects dir");
    fs::create_dir_all(dir.path().join("templates")).expect("Failed to create templates dir");
    dir
}

pub fn write_task(workspace: &Path, project: &str, task: &str, instruction: &str) -> PathBuf {
    let task_dir = workspace.join("projects").join(project).join(task);
    fs::create_dir_all(&task_dir).expect("Failed to create task dir");
    fs::write(task_dir.join("instruction.yaml"), instruction)
        .expect("Failed to write instruction.yaml");
    task_dir
}

pub fn write_script(task_dir: &Path, name: &str, content: &str) {
    let path = task_dir.join(name);
    fs::write(&path, content).expect("Failed to write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
    }
}

pub fn instruction(name: &str, deps: &[&str], inputs: &[&str], outputs: &[&str]) -> String {
    let quote = |items: &[&str]| {
        items
            .iter()
            .map(|item| format!("\"{}\"", item))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        r#"name: {}
description: Test task {}
dependencies: [{}]
inputs: [{}]
outputs: [{}]
"#,
        name,
        name,
        quote(deps),
        quote(inputs),
        quote(outputs),
    )
}
