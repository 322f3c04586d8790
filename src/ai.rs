//! AI task back-end
//!
//! Loads `prompt.yaml`, chooses an HTTP provider by model-name pattern, and
//! writes the generated response to `output/response.md`. The provider seam
//! is a trait object so new endpoints slot in without touching the executor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::completion::ExecutionReport;
use crate::fsops::atomic_write;
use crate::workspace::Task;

const API_KEY_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "LLM_API_KEY",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4000;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("prompt.yaml not found in {}", .0.display())]
    PromptMissing(PathBuf),

    #[error("malformed prompt.yaml: {0}")]
    PromptInvalid(#[from] serde_yaml::Error),

    #[error("no API key found; set one of: {0}")]
    MissingApiKey(String),

    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

/// Configuration for an AI task, read from `prompt.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Explicit user prompt; falls back to the task description.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl PromptConfig {
    pub fn load(task_dir: &Path) -> Result<Self, AiError> {
        let path = task_dir.join("prompt.yaml");
        let content = std::fs::read_to_string(&path)
            .map_err(|_| AiError::PromptMissing(task_dir.to_path_buf()))?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Provider family inferred from the model name.
pub fn detect_provider(model: &str) -> &'static str {
    let model = model.to_lowercase();
    if model.contains("claude") || model.contains("anthropic") {
        "anthropic"
    } else {
        // gpt-*, gemini-via-compatible-endpoint, and anything unknown go to
        // the OpenAI-compatible API.
        "openai"
    }
}

#[async_trait]
trait Provider: Send + Sync {
    async fn generate(
        &self,
        config: &PromptConfig,
        api_key: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError>;
}

struct OpenAiProvider;

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(
        &self,
        config: &PromptConfig,
        api_key: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError> {
        let body = json!({
            "model": config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": config.temperature,
            "max_tokens": MAX_TOKENS,
        });

        let response = reqwest::Client::new()
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AiError::MalformedResponse("missing choices[0].message.content".to_string())
            })
    }
}

struct AnthropicProvider;

#[async_trait]
impl Provider for AnthropicProvider {
    async fn generate(
        &self,
        config: &PromptConfig,
        api_key: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError> {
        let body = json!({
            "model": config.model,
            "max_tokens": MAX_TOKENS,
            "temperature": config.temperature,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
        });

        let response = reqwest::Client::new()
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::MalformedResponse("missing content[0].text".to_string()))
    }
}

fn provider_for(model: &str) -> Box<dyn Provider> {
    match detect_provider(model) {
        "anthropic" => Box::new(AnthropicProvider),
        _ => Box::new(OpenAiProvider),
    }
}

fn api_key() -> Result<String, AiError> {
    for name in API_KEY_VARS {
        if let Ok(key) = std::env::var(name) {
            if !key.is_empty() {
                debug!(variable = name, "using API key");
                return Ok(key);
            }
        }
    }
    Err(AiError::MissingApiKey(API_KEY_VARS.join(", ")))
}

/// Execute an AI task: load `prompt.yaml`, call the provider, and write the
/// response. The caller writes `done.md` afterwards, mirroring machine tasks.
pub async fn run_ai_task(task: &Task, report: &mut ExecutionReport) -> Result<(), AiError> {
    let config = PromptConfig::load(&task.path)?;

    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| "You are a helpful AI assistant.".to_string());
    let mut user_prompt = config
        .prompt
        .clone()
        .unwrap_or_else(|| task.instruction.description.clone());
    if let Some(note) = &task.instruction.note {
        user_prompt.push_str("\n\nAdditional context:\n");
        user_prompt.push_str(note);
    }

    let key = api_key()?;
    let provider = provider_for(&config.model);

    info!(task = %task.full_name(), model = %config.model, "generating AI response");
    report.record(format!(
        "provider request: {} via {}",
        config.model,
        detect_provider(&config.model)
    ));

    let response = provider
        .generate(&config, &key, &system_prompt, &user_prompt)
        .await?;

    save_response(&task.path, &response)?;
    report.record("response written to output/response.md");
    Ok(())
}

/// Write the response to `output/response.md` with a generated-at header.
pub fn save_response(task_dir: &Path, response: &str) -> Result<PathBuf, AiError> {
    let path = task_dir.join("output").join("response.md");
    let content = format!(
        "# AI Task Response\n\n**Generated**: {}\n\n---\n\n{}\n",
        Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        response
    );
    atomic_write(&path, &content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_provider_patterns() {
        assert_eq!(detect_provider("gpt-4o"), "openai");
        assert_eq!(detect_provider("claude-3-5-sonnet"), "anthropic");
        assert_eq!(detect_provider("Anthropic-latest"), "anthropic");
        assert_eq!(detect_provider("some-local-model"), "openai");
    }

    #[test]
    fn test_prompt_config_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("prompt.yaml"), "prompt: Summarise the data\n").unwrap();

        let config = PromptConfig::load(dir.path()).unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.prompt.as_deref(), Some("Summarise the data"));
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_prompt_config_explicit_values() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("prompt.yaml"),
            "model: claude-3-opus\ntemperature: 0.2\nsystem_prompt: Be terse\n",
        )
        .unwrap();

        let config = PromptConfig::load(dir.path()).unwrap();
        assert_eq!(config.model, "claude-3-opus");
        assert!((config.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.system_prompt.as_deref(), Some("Be terse"));
    }

    #[test]
    fn test_prompt_config_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            PromptConfig::load(dir.path()),
            Err(AiError::PromptMissing(_))
        ));
    }

    #[test]
    fn test_save_response() {
        let dir = tempdir().unwrap();

        let path = save_response(dir.path(), "The answer is 42.").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# AI Task Response"));
        assert!(content.contains("The answer is 42."));
        assert!(path.ends_with("output/response.md"));
    }
}
