use std::thread;
use std::time::Duration;

use anonymizer_core::Entity;
use anonymizer_llm::{LlmClient, LlmRequest};
use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::prompts::render;

/// Anything that turns a prompt into raw model output.
pub trait Completion {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<F> Completion for F
where
    F: Fn(&str) -> Result<String>,
{
    fn complete(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// Blocking completion backed by the chat client.
#[derive(Clone)]
pub struct LlmCompletion {
    client: LlmClient,
}

impl LlmCompletion {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

impl Completion for LlmCompletion {
    fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.client.chat_blocking(&LlmRequest {
            system: None,
            user: prompt.to_string(),
        })?;
        tracing::debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "oracle usage"
        );
        Ok(response.content)
    }
}

/// What to do once every attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Fail the chunk, and with it the document.
    #[default]
    Strict,
    /// Treat the chunk as containing no entities; it passes through unchanged.
    Permissive,
}

impl ExhaustionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustionPolicy::Strict => "strict",
            ExhaustionPolicy::Permissive => "permissive",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "strict" => Some(ExhaustionPolicy::Strict),
            "permissive" => Some(ExhaustionPolicy::Permissive),
            _ => None,
        }
    }
}

/// Fixed-delay retry: no backoff growth, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("entity detection failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[derive(Deserialize)]
struct EntityResponse {
    #[serde(default)]
    entities: Vec<Entity>,
}

pub struct EntityOracle<C> {
    completion: C,
    prompt_template: String,
    model: String,
    retry: RetryPolicy,
    policy: ExhaustionPolicy,
}

impl EntityOracle<LlmCompletion> {
    pub fn from_client(client: LlmClient, prompt_template: impl Into<String>) -> Self {
        let model = client.model().to_string();
        Self::new(LlmCompletion::new(client), prompt_template, model)
    }
}

impl<C: Completion> EntityOracle<C> {
    pub fn new(
        completion: C,
        prompt_template: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            prompt_template: prompt_template.into(),
            model: model.into(),
            retry: RetryPolicy::default(),
            policy: ExhaustionPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    /// Detect entities in `text`, retrying malformed or failed responses.
    ///
    /// Blocks for the retry delay between attempts. Once attempts run out the
    /// configured [`ExhaustionPolicy`] decides between an error and an empty list.
    pub fn identify(&self, text: &str) -> std::result::Result<Vec<Entity>, OracleError> {
        let prompt = render(&self.prompt_template, text);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            tracing::info!(
                model = %self.model,
                attempt,
                max_attempts = attempts,
                text_chars = text.chars().count(),
                "calling entity oracle"
            );
            match self.call_once(&prompt) {
                Ok(entities) => return Ok(entities),
                Err(err) => {
                    let message = format!("{err:#}");
                    tracing::warn!(attempt, error = %message, "oracle attempt failed");
                    last_error = message;
                }
            }
            if attempt < attempts {
                thread::sleep(self.retry.delay);
            }
        }
        match self.policy {
            ExhaustionPolicy::Strict => {
                tracing::error!(attempts, "max retries reached, aborting chunk");
                Err(OracleError::Exhausted {
                    attempts,
                    last_error,
                })
            }
            ExhaustionPolicy::Permissive => {
                tracing::error!(attempts, "max retries reached, continuing without entities");
                Ok(Vec::new())
            }
        }
    }

    fn call_once(&self, prompt: &str) -> Result<Vec<Entity>> {
        let raw = self.completion.complete(prompt)?;
        tracing::debug!(response_chars = raw.chars().count(), "oracle responded");
        parse_entities(&raw)
    }
}

/// Parse an oracle reply, tolerating markdown code fences around the JSON.
pub fn parse_entities(raw: &str) -> Result<Vec<Entity>> {
    let cleaned = strip_code_fences(raw);
    let response: EntityResponse = serde_json::from_str(&cleaned).with_context(|| {
        let preview: String = cleaned.chars().take(200).collect();
        format!("malformed oracle response: {preview}")
    })?;
    Ok(response.entities)
}

fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}
