use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anonymizer_core::normalize_kind;
use anonymizer_llm::{LlmClient, LlmProvider};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::logging::parse_bool;
use crate::oracle::{EntityOracle, ExhaustionPolicy, LlmCompletion, RetryPolicy};
use crate::pipeline::EntityFilter;
use crate::prompts::PromptKind;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizerConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub prompt: PromptKind,
    pub on_exhaustion: ExhaustionPolicy,
    /// Upper-cased entity types to anonymize; empty means every type.
    pub entity_types: Vec<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub parallel_detection: bool,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        let provider = LlmProvider::Gemini;
        Self {
            provider,
            model: provider.default_model().to_string(),
            prompt: PromptKind::default(),
            on_exhaustion: ExhaustionPolicy::default(),
            entity_types: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            parallel_detection: false,
        }
    }
}

/// On-disk shape; every field is optional and falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    provider: Option<String>,
    model: Option<String>,
    prompt: Option<PromptKind>,
    on_exhaustion: Option<ExhaustionPolicy>,
    entity_types: Option<Vec<String>>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    parallel_detection: Option<bool>,
}

impl AnonymizerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(name) = lookup("ANONYMIZER_PROVIDER") {
            config.set_provider(&name)?;
        }
        if let Some(model) = lookup("ANONYMIZER_MODEL") {
            config.model = model;
        }
        if let Some(prompt) = lookup("ANONYMIZER_PROMPT") {
            config.prompt = PromptKind::from_str(&prompt)
                .ok_or_else(|| anyhow!("unknown prompt {prompt}"))?;
        }
        if let Some(policy) = lookup("ANONYMIZER_ON_EXHAUSTION") {
            config.on_exhaustion = ExhaustionPolicy::from_str(&policy)
                .ok_or_else(|| anyhow!("unknown exhaustion policy {policy}"))?;
        }
        if let Some(types) = lookup("ANONYMIZER_ENTITY_TYPES") {
            config.entity_types = parse_entity_types(types.split(','));
        }
        if let Some(value) = lookup("ANONYMIZER_MAX_ATTEMPTS") {
            config.max_attempts = parse_number("ANONYMIZER_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("ANONYMIZER_RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_number("ANONYMIZER_RETRY_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("ANONYMIZER_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("ANONYMIZER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("ANONYMIZER_PARALLEL") {
            config.parallel_detection = parse_bool(&value);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml::from_str(raw).context("invalid anonymizer config")?;
        let mut config = Self::default();
        if let Some(name) = file.provider {
            config.set_provider(&name)?;
        }
        if let Some(model) = file.model {
            config.model = model;
        }
        if let Some(prompt) = file.prompt {
            config.prompt = prompt;
        }
        if let Some(policy) = file.on_exhaustion {
            config.on_exhaustion = policy;
        }
        if let Some(types) = file.entity_types {
            config.entity_types = parse_entity_types(types.iter().map(String::as_str));
        }
        config.max_attempts = file.max_attempts.unwrap_or(config.max_attempts);
        config.retry_delay_ms = file.retry_delay_ms.unwrap_or(config.retry_delay_ms);
        config.timeout_secs = file.timeout_secs.unwrap_or(config.timeout_secs);
        config.parallel_detection = file.parallel_detection.unwrap_or(config.parallel_detection);
        config.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn entity_filter(&self) -> EntityFilter {
        EntityFilter::new(self.entity_types.iter().cloned())
    }

    pub fn build_client(&self) -> Result<LlmClient> {
        LlmClient::new(self.provider, self.model.clone())?
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn build_oracle(&self) -> Result<EntityOracle<LlmCompletion>> {
        let client = self.build_client()?;
        Ok(EntityOracle::from_client(client, self.prompt.template())
            .with_retry(self.retry_policy())
            .with_policy(self.on_exhaustion))
    }

    fn set_provider(&mut self, name: &str) -> Result<()> {
        let provider = LlmProvider::from_str(name)
            .ok_or_else(|| anyhow!("unknown provider {name}"))?;
        if provider != self.provider {
            self.model = provider.default_model().to_string();
        }
        self.provider = provider;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must not be empty"));
        }
        Ok(())
    }
}

fn parse_entity_types<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut types: Vec<String> = raw
        .filter(|value| !value.trim().is_empty())
        .map(normalize_kind)
        .collect();
    types.dedup();
    types
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be a number, got {value:?}"))
}
