//! Executor error types

use crate::ai::AiError;
use crate::workspace::InstructionError;

/// Errors that can occur while executing a task.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("no executable script found in {0}")]
    NoScript(String),

    #[error("input missing for {task}: {reason}")]
    InputMissing { task: String, reason: String },

    #[error("script failed in {task} (exit code {code:?})")]
    ScriptFailed {
        task: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("declared output missing after execution: {0}")]
    OutputMissing(String),

    #[error("execution lock held for {0}")]
    LockHeld(String),

    #[error("instruction error: {0}")]
    Instruction(#[from] InstructionError),

    #[error("AI back-end error: {0}")]
    Ai(#[from] AiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Stable kind label recorded in failure logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::NoScript(_) => "NoScript",
            ExecutorError::InputMissing { .. } => "InputMissing",
            ExecutorError::ScriptFailed { .. } => "ScriptFailed",
            ExecutorError::OutputMissing(_) => "OutputMissing",
            ExecutorError::LockHeld(_) => "LockHeld",
            ExecutorError::Instruction(_) => "MalformedInstruction",
            ExecutorError::Ai(_) => "AiBackend",
            ExecutorError::Io(_) => "Io",
        }
    }
}
