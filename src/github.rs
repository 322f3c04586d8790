//! GitHub integration
//!
//! Thin shell around the `gh` CLI: the core only supplies Task and Project
//! metadata, formatted here into issue titles and bodies. A task gets a
//! child issue; a project gets a parent issue rolling up its tasks.

use tokio::process::Command;
use tracing::info;

use crate::workspace::{Project, Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("`gh` CLI not found on PATH")]
    GhNotFound,

    #[error("gh exited with {code:?}: {stderr}")]
    GhFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn format_issue_title(task: &Task) -> String {
    format!("[{}] {}", task.full_name(), task.instruction.description)
}

pub fn format_issue_body(task: &Task) -> String {
    let mut body = String::new();
    body.push_str(&format!("## Task: `{}`\n\n", task.full_name()));
    body.push_str(&format!("{}\n\n", task.instruction.description));
    body.push_str(&format!("- **Type**: {}\n", task.task_type));
    body.push_str(&format!("- **Status**: {}\n", task.status));
    if let Some(auto_merge) = task.instruction.auto_merge {
        body.push_str(&format!("- **Auto-merge**: {}\n", auto_merge));
    }

    if !task.instruction.dependencies.is_empty() {
        body.push_str("\n### Dependencies\n\n");
        for dep in &task.instruction.dependencies {
            body.push_str(&format!("- `{}`\n", dep));
        }
    }

    if !task.instruction.inputs.is_empty() {
        body.push_str("\n### Inputs\n\n");
        for input in &task.instruction.inputs {
            body.push_str(&format!("- `{}`\n", input));
        }
    }

    if !task.instruction.outputs.is_empty() {
        body.push_str("\n### Outputs\n\n");
        for output in &task.instruction.outputs {
            body.push_str(&format!("- `{}`\n", output));
        }
    }

    if let Some(note) = &task.instruction.note {
        body.push_str(&format!("\n### Notes\n\n{}\n", note));
    }

    body.push_str(&format!(
        "\nRun this task with `warifuri run --task {}`.\n",
        task.full_name()
    ));
    body
}

pub fn format_project_issue_title(project: &Project) -> String {
    format!("[PROJECT] {}", project.name)
}

/// Parent-issue body: project overview plus a per-task status roll-up.
/// The roll-up section is omitted for a project without tasks.
pub fn format_project_issue_body(project: &Project) -> String {
    let mut body = String::new();
    body.push_str(&format!("## Project: `{}`\n\n", project.name));
    body.push_str(&format!(
        "Parent issue tracking overall progress of '{}'.\n",
        project.name
    ));

    if !project.tasks.is_empty() {
        body.push_str("\n### Tasks\n\n");
        for task in &project.tasks {
            let symbol = match task.status {
                TaskStatus::Completed => "✅",
                TaskStatus::Ready => "🔄",
                TaskStatus::Pending => "⏸️",
            };
            body.push_str(&format!(
                "- {} **{}**: {}\n",
                symbol, task.name, task.instruction.description
            ));
        }
    }

    body.push_str(&format!(
        "\nRun ready tasks from this project with `warifuri run --task {}`.\n",
        project.name
    ));
    body
}

/// Create a child issue for a task by shelling out to `gh issue create`.
pub async fn create_task_issue(
    task: &Task,
    labels: &[String],
    dry_run: bool,
) -> Result<(), GithubError> {
    let title = format_issue_title(task);
    let body = format_issue_body(task);
    create_issue(&title, &body, labels, dry_run).await?;
    info!(task = %task.full_name(), "issue handled");
    Ok(())
}

/// Create a parent issue rolling up a project's tasks.
pub async fn create_project_issue(
    project: &Project,
    labels: &[String],
    dry_run: bool,
) -> Result<(), GithubError> {
    let title = format_project_issue_title(project);
    let body = format_project_issue_body(project);
    create_issue(&title, &body, labels, dry_run).await?;
    info!(project = %project.name, "project issue handled");
    Ok(())
}

async fn create_issue(
    title: &str,
    body: &str,
    labels: &[String],
    dry_run: bool,
) -> Result<(), GithubError> {
    if which::which("gh").is_err() {
        return Err(GithubError::GhNotFound);
    }

    if dry_run {
        println!(
            "[DRY RUN] Would create issue:\n  Title: {}\n\n{}",
            title, body
        );
        return Ok(());
    }

    let mut command = Command::new("gh");
    command.args(["issue", "create", "--title", title, "--body", body]);
    for label in labels {
        command.args(["--label", label]);
    }

    let output = command.output().await?;
    if !output.status.success() {
        return Err(GithubError::GhFailed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    println!("{}", String::from_utf8_lossy(&output.stdout).trim());
    Ok(())
}
