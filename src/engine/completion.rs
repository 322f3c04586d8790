//! Completion markers and forensic logs
//!
//! `done.md` is rename-published; log files are append-only, one per
//! invocation, uniquely named by timestamp. `done.md` is written only on
//! execution success.

use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::fsops::atomic_write;
use crate::workspace::Task;

/// Current commit hash of the workspace repository, if discoverable.
pub async fn git_commit_sha(workspace: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(workspace)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        None
    } else {
        Some(sha)
    }
}

/// Write the completion marker: an ISO-8601 timestamp and the commit hash
/// (or `unknown`), optionally preceded by a message line.
pub async fn write_done_file(
    task: &Task,
    workspace: &Path,
    message: Option<&str>,
) -> std::io::Result<()> {
    let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    let sha = git_commit_sha(workspace)
        .await
        .unwrap_or_else(|| "unknown".to_string());

    let line = format!("{} SHA: {}", timestamp, sha);
    let content = match message {
        Some(message) => format!("{}\n\n{}\n", message, line),
        None => format!("{}\n", line),
    };

    atomic_write(&task.done_path(), &content)?;
    debug!(task = %task.full_name(), "wrote completion marker");
    Ok(())
}

/// Everything the executor observed during one run, rendered into the
/// success or failure log.
#[derive(Debug)]
pub struct ExecutionReport {
    pub run_id: String,
    pub command: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    trace: Vec<String>,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            command: None,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            trace: Vec::new(),
        }
    }

    pub fn record(&mut self, line: impl Into<String>) {
        self.trace.push(line.into());
    }

    fn render(&self, task: &Task, error_kind: Option<&str>, commit: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("Task: {}\n", task.full_name()));
        out.push_str(&format!(
            "Status: {}\n",
            if error_kind.is_some() { "failed" } else { "success" }
        ));
        if let Some(kind) = error_kind {
            out.push_str(&format!("Error: {}\n", kind));
        }
        out.push_str(&format!(
            "Timestamp: {}\n",
            Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
        ));
        out.push_str(&format!("Commit: {}\n", commit));
        out.push_str(&format!("Run ID: {}\n", self.run_id));
        if let Some(command) = &self.command {
            out.push_str(&format!("Command: {}\n", command));
        }

        out.push_str("\n=== Execution trace ===\n");
        for line in &self.trace {
            out.push_str(line);
            out.push('\n');
        }

        out.push_str("\n=== stdout ===\n");
        out.push_str(&self.stdout);
        out.push_str("\n=== stderr ===\n");
        out.push_str(&self.stderr);
        out.push_str(&format!("\nExit code: {:?}\n", self.exit_code));
        out
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}

fn log_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Write `logs/failed_<ts>.log`. Exactly one per failed execution.
pub async fn log_failure(
    task: &Task,
    workspace: &Path,
    report: &ExecutionReport,
    error_kind: &str,
) -> std::io::Result<PathBuf> {
    let commit = git_commit_sha(workspace)
        .await
        .unwrap_or_else(|| "unknown".to_string());
    let path = task.logs_dir().join(format!("failed_{}.log", log_stamp()));
    atomic_write(&path, &report.render(task, Some(error_kind), &commit))?;
    debug!(task = %task.full_name(), path = %path.display(), "wrote failure log");
    Ok(path)
}

/// Write `logs/execution_success_<ts>.log`.
pub async fn log_success(
    task: &Task,
    workspace: &Path,
    report: &ExecutionReport,
) -> std::io::Result<PathBuf> {
    let commit = git_commit_sha(workspace)
        .await
        .unwrap_or_else(|| "unknown".to_string());
    let path = task
        .logs_dir()
        .join(format!("execution_success_{}.log", log_stamp()));
    atomic_write(&path, &report.render(task, None, &commit))?;
    debug!(task = %task.full_name(), path = %path.display(), "wrote success log");
    Ok(path)
}
