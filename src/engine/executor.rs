//! Sandboxed task execution
//!
//! Machine tasks run inside a private staging directory in the system temp
//! area: the task directory is mirrored in, declared inputs are materialised,
//! the script runs with strict shell flags, and declared outputs are copied
//! back only after the script succeeded and every output exists. Partial
//! writes never reach the task directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use super::completion::{self, ExecutionReport};
use super::error::ExecutorError;
use super::paths::resolve_input_path;
use crate::ai;
use crate::fsops::{self, FileLock, LockError, DEFAULT_RMTREE_RETRIES};
use crate::workspace::loader::PROJECTS_DIR;
use crate::workspace::{Task, TaskType};

pub const ENV_PROJECT_NAME: &str = "WARIFURI_PROJECT_NAME";
pub const ENV_TASK_NAME: &str = "WARIFURI_TASK_NAME";
pub const ENV_WORKSPACE_DIR: &str = "WARIFURI_WORKSPACE_DIR";
pub const ENV_INPUT_DIR: &str = "WARIFURI_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "WARIFURI_OUTPUT_DIR";

/// Execution knobs passed in from the CLI.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub dry_run: bool,
    /// Re-run even when `done.md` already exists.
    pub force: bool,
    /// Wall-clock limit for the task subprocess. `None` (the default) lets
    /// the script run to completion.
    pub timeout: Option<Duration>,
    /// How long to wait for the per-task execution lock.
    pub lock_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            timeout: None,
            lock_timeout: Duration::from_secs(10),
        }
    }
}

/// Executes tasks against a workspace.
pub struct TaskExecutor {
    workspace: PathBuf,
    config: ExecutionConfig,
}

impl TaskExecutor {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self::with_config(workspace, ExecutionConfig::default())
    }

    pub fn with_config(workspace: impl AsRef<Path>, config: ExecutionConfig) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            config,
        }
    }

    /// Execute a task according to its type. Completion is monotonic: an
    /// already-completed task returns success without re-executing unless
    /// `force` is set.
    pub async fn execute(&self, task: &Task) -> Result<(), ExecutorError> {
        if task.is_completed() && !self.config.force {
            info!(task = %task.full_name(), "task already completed");
            return Ok(());
        }

        match task.task_type {
            TaskType::Machine => self.execute_machine(task).await,
            TaskType::Ai => self.execute_ai(task).await,
            TaskType::Human => self.execute_human(task),
        }
    }

    async fn execute_machine(&self, task: &Task) -> Result<(), ExecutorError> {
        info!(task = %task.full_name(), "executing machine task");

        if self.config.dry_run {
            info!(task = %task.full_name(), "[dry run] would execute machine task");
            return Ok(());
        }

        let lock = match self.acquire_execution_lock(task).await {
            Ok(lock) => lock,
            Err(LockError::Timeout { .. }) => {
                // The lock holder may have completed the task while we waited.
                if task.is_completed() {
                    info!(task = %task.full_name(), "completed by a concurrent runner");
                    return Ok(());
                }
                return Err(ExecutorError::LockHeld(task.full_name()));
            }
            Err(LockError::Io(err)) => return Err(ExecutorError::Io(err)),
        };

        // Same race, lost after the winner released the lock.
        if task.is_completed() && !self.config.force {
            info!(task = %task.full_name(), "completed by a concurrent runner");
            drop(lock);
            return Ok(());
        }

        let mut report = ExecutionReport::new();
        let result = self.run_sandboxed(task, &mut report).await;

        let outcome = match result {
            Ok(()) => {
                completion::log_success(task, &self.workspace, &report).await?;
                completion::write_done_file(
                    task,
                    &self.workspace,
                    Some("Machine task completed successfully"),
                )
                .await?;
                info!(task = %task.full_name(), "machine task completed");
                Ok(())
            }
            Err(err) => {
                completion::log_failure(task, &self.workspace, &report, err.kind()).await?;
                Err(err)
            }
        };

        drop(lock);
        outcome
    }

    async fn acquire_execution_lock(&self, task: &Task) -> Result<FileLock, LockError> {
        let lock_path = task.lock_path();
        let timeout = self.config.lock_timeout;
        match tokio::task::spawn_blocking(move || FileLock::acquire(&lock_path, timeout)).await {
            Ok(result) => result,
            Err(join_err) => Err(LockError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("lock acquisition task failed: {}", join_err),
            ))),
        }
    }

    /// Steps 2-10: staging, mirroring, input materialisation, invocation,
    /// output validation and atomic publication. Staging is removed on every
    /// path.
    async fn run_sandboxed(
        &self,
        task: &Task,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutorError> {
        let staging = create_staging_dir()?;
        report.record(format!("staging directory: {}", staging.display()));

        let result = self.run_in_staging(task, &staging, report).await;

        if let Err(err) = fsops::safe_rmtree(&staging, DEFAULT_RMTREE_RETRIES) {
            warn!(path = %staging.display(), error = %err, "failed to remove staging directory");
        }
        result
    }

    async fn run_in_staging(
        &self,
        task: &Task,
        staging: &Path,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutorError> {
        fsops::copy_dir_recursive(&task.path, staging)?;
        report.record("mirrored task directory into staging");

        self.materialize_inputs(task, staging, report)?;

        let script = find_entry_point(staging)
            .ok_or_else(|| ExecutorError::NoScript(task.full_name()))?;

        let (program, args) = build_command(&script);
        let rendered = format!("{} {}", program, args.join(" "));
        report.command = Some(rendered.clone());
        report.record(format!("command: {}", rendered));

        let env = task_environment(task, &self.workspace);
        for (key, value) in &env {
            report.record(format!("env: {}={}", key, value));
        }

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(staging)
            .envs(&env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => output?,
                Err(_) => {
                    report.record(format!("script timed out after {:?}", limit));
                    return Err(ExecutorError::ScriptFailed {
                        task: task.full_name(),
                        code: None,
                        stderr: format!("timed out after {:?}", limit),
                    });
                }
            },
            None => command.output().await?,
        };

        report.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        report.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        report.exit_code = output.status.code();

        if !output.status.success() {
            report.record(format!("script exited with {:?}", output.status.code()));
            return Err(ExecutorError::ScriptFailed {
                task: task.full_name(),
                code: output.status.code(),
                stderr: report.stderr.clone(),
            });
        }
        report.record("script completed successfully");

        self.validate_and_publish(task, staging, report)
    }

    /// Step 4: resolve each declared input and stage it. Cross-project inputs
    /// land under a flattened name so scripts see a flat input surface and
    /// cannot escape; task-local inputs keep their relative layout.
    fn materialize_inputs(
        &self,
        task: &Task,
        staging: &Path,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutorError> {
        let projects_base = self.workspace.join(PROJECTS_DIR);
        let task_dir_real = task.path.canonicalize()?;

        for reference in &task.instruction.inputs {
            let resolved = match resolve_input_path(reference, &task.path, &projects_base) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    report.record(format!("input '{}' rejected: {}", reference, reason));
                    return Err(ExecutorError::InputMissing {
                        task: task.full_name(),
                        reason,
                    });
                }
            };

            if !resolved.path.exists() {
                let reason = format!(
                    "input '{}' does not exist at {}",
                    reference,
                    resolved.path.display()
                );
                report.record(reason.clone());
                return Err(ExecutorError::InputMissing {
                    task: task.full_name(),
                    reason,
                });
            }
            report.record(resolved.detail.clone());

            if resolved.cross_project {
                let flat = flatten_reference(reference);
                fs::copy(&resolved.path, staging.join(&flat))?;
                report.record(format!("materialised '{}' as '{}'", reference, flat));
            } else {
                let relative = resolved
                    .path
                    .strip_prefix(&task_dir_real)
                    .unwrap_or_else(|_| Path::new(reference));
                let destination = staging.join(relative);
                if !destination.exists() {
                    if let Some(parent) = destination.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(&resolved.path, &destination)?;
                }
            }
        }
        Ok(())
    }

    /// Steps 9-10: every declared output must exist in staging, then each is
    /// published with the atomic copy primitive. Undeclared files in staging
    /// are discarded with it.
    fn validate_and_publish(
        &self,
        task: &Task,
        staging: &Path,
        report: &mut ExecutionReport,
    ) -> Result<(), ExecutorError> {
        for output in &task.instruction.outputs {
            if !staging.join(output).exists() {
                report.record(format!("declared output missing: {}", output));
                return Err(ExecutorError::OutputMissing(output.clone()));
            }
        }

        for output in &task.instruction.outputs {
            let source = staging.join(output);
            let destination = task.path.join(output);
            if source.is_dir() {
                fsops::copy_dir_recursive(&source, &destination)?;
            } else {
                fsops::atomic_copy(&source, &destination)?;
            }
            report.record(format!("published output: {}", output));
        }
        Ok(())
    }

    async fn execute_ai(&self, task: &Task) -> Result<(), ExecutorError> {
        info!(task = %task.full_name(), "executing AI task");

        if self.config.dry_run {
            info!(task = %task.full_name(), "[dry run] would execute AI task");
            return Ok(());
        }

        let mut report = ExecutionReport::new();
        match ai::run_ai_task(task, &mut report).await {
            Ok(()) => {
                completion::log_success(task, &self.workspace, &report).await?;
                completion::write_done_file(
                    task,
                    &self.workspace,
                    Some("AI task completed successfully"),
                )
                .await?;
                info!(task = %task.full_name(), "AI task completed");
                Ok(())
            }
            Err(err) => {
                let err = ExecutorError::Ai(err);
                completion::log_failure(task, &self.workspace, &report, err.kind()).await?;
                Err(err)
            }
        }
    }

    /// Human tasks only print guidance; completion happens via `mark-done`.
    fn execute_human(&self, task: &Task) -> Result<(), ExecutorError> {
        info!(task = %task.full_name(), "human task");

        if self.config.dry_run {
            info!(task = %task.full_name(), "[dry run] human task requires manual intervention");
            return Ok(());
        }

        println!(
            "Human task '{}' requires manual intervention.",
            task.full_name()
        );
        println!("Description: {}", task.instruction.description);
        println!(
            "Complete the task manually and run 'warifuri mark-done {}' when finished.",
            task.full_name()
        );
        Ok(())
    }
}

/// Fresh owner-only directory in the system temp area. The prefix keeps the
/// tool identifiable in `/tmp` listings.
fn create_staging_dir() -> io::Result<PathBuf> {
    let staging = std::env::temp_dir().join(format!("warifuri_{}", Uuid::new_v4().simple()));
    fs::create_dir_all(&staging)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o700))?;
    }
    Ok(staging)
}

/// `run.sh` takes precedence over `run.py`.
fn find_entry_point(staging: &Path) -> Option<PathBuf> {
    ["run.sh", "run.py"]
        .iter()
        .map(|name| staging.join(name))
        .find(|path| path.exists())
}

/// Shell scripts run under `-euo pipefail`: hard failure on any error, unset
/// variable use, or failed pipe stage.
fn build_command(script: &Path) -> (String, Vec<String>) {
    if script.extension().and_then(|e| e.to_str()) == Some("py") {
        let interpreter = which::which("python3")
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "python3".to_string());
        (interpreter, vec![script.display().to_string()])
    } else {
        (
            "bash".to_string(),
            vec![
                "-euo".to_string(),
                "pipefail".to_string(),
                script.display().to_string(),
            ],
        )
    }
}

fn task_environment(task: &Task, workspace: &Path) -> HashMap<String, String> {
    let workspace_abs = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());

    HashMap::from([
        (ENV_PROJECT_NAME.to_string(), task.project.clone()),
        (ENV_TASK_NAME.to_string(), task.name.clone()),
        (
            ENV_WORKSPACE_DIR.to_string(),
            workspace_abs.display().to_string(),
        ),
        (ENV_INPUT_DIR.to_string(), "input".to_string()),
        (ENV_OUTPUT_DIR.to_string(), "output".to_string()),
    ])
}

/// Join the reference's normal path components with `_`, dropping `.` and
/// `..` segments: `../a/data.txt` becomes `a_data.txt`.
fn flatten_reference(reference: &str) -> String {
    Path::new(reference)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}
