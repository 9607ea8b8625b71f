use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tokio::runtime::Runtime;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const HUGGINGFACE_URL: &str = "https://router.huggingface.co/v1/chat/completions";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const LOCAL_RESPONSE: &str = r#"{"entities": []}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    Ollama,
    OpenRouter,
    HuggingFace,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "google",
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::HuggingFace => "huggingface",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "google" | "gemini" => Some(LlmProvider::Gemini),
            "ollama" => Some(LlmProvider::Ollama),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "huggingface" | "hf" => Some(LlmProvider::HuggingFace),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.5-flash-lite",
            LlmProvider::Ollama => "gemma:7b",
            LlmProvider::OpenRouter => "google/gemma-3-27b-it:free",
            LlmProvider::HuggingFace => "meta-llama/Llama-3.1-8B-Instruct",
            LlmProvider::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    Gemini(ApiKeyConfig),
    Ollama(OllamaConfig),
    OpenRouter(ApiKeyConfig),
    HuggingFace(ApiKeyConfig),
    Local,
}

#[derive(Clone)]
struct ApiKeyConfig {
    api_key: String,
}

#[derive(Clone)]
struct OllamaConfig {
    host: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let http = Client::new();
        let config = match provider {
            LlmProvider::Gemini => ProviderConfig::Gemini(ApiKeyConfig {
                api_key: read_api_key("GOOGLE_API_KEY")?,
            }),
            LlmProvider::Ollama => ProviderConfig::Ollama(OllamaConfig {
                host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
            }),
            LlmProvider::OpenRouter => ProviderConfig::OpenRouter(ApiKeyConfig {
                api_key: read_api_key("OPENROUTER_API_KEY")?,
            }),
            LlmProvider::HuggingFace => ProviderConfig::HuggingFace(ApiKeyConfig {
                api_key: read_api_key("HUGGING_FACE_TOKEN")?,
            }),
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http,
            provider,
            model,
            config,
        })
    }

    /// Bound every outbound request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(self)
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        tracing::debug!(
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = req.user.chars().count(),
            "sending chat request"
        );
        match &self.config {
            ProviderConfig::Gemini(cfg) => self.chat_gemini(cfg, req).await,
            ProviderConfig::Ollama(cfg) => self.chat_ollama(cfg, req).await,
            ProviderConfig::OpenRouter(cfg) => {
                self.chat_openai_compatible("openrouter", OPENROUTER_URL, cfg, req)
                    .await
            }
            ProviderConfig::HuggingFace(cfg) => {
                self.chat_openai_compatible("huggingface", HUGGINGFACE_URL, cfg, req)
                    .await
            }
            ProviderConfig::Local => Ok(self.chat_local()),
        }
    }

    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.chat(req))
    }

    async fn chat_openai_compatible(
        &self,
        label: &str,
        url: &str,
        cfg: &ApiKeyConfig,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let payload = json!({
            "model": self.model,
            "messages": chat_messages(req),
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{label} request failed"))?;
        let value = decode_body(label, response).await?;
        let content = extract_chat_text(&value)
            .ok_or_else(|| anyhow!(format!("missing text in {label} response")))?;
        let usage: ChatUsage = value
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    async fn chat_ollama(&self, cfg: &OllamaConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", cfg.host.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": chat_messages(req),
            "stream": false,
        });
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| "ollama request failed")?
            .error_for_status()
            .context("ollama returned an error")?
            .json::<OllamaResponse>()
            .await
            .context("failed to decode ollama response")?;
        let content = response
            .message
            .map(|message| message.content)
            .ok_or_else(|| anyhow!("missing message in Ollama response"))?;
        Ok(LlmResponse {
            content,
            prompt_tokens: response.prompt_eval_count.unwrap_or(0),
            completion_tokens: response.eval_count.unwrap_or(0),
        })
    }

    async fn chat_gemini(&self, cfg: &ApiKeyConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let mut prompt = String::new();
        if let Some(system) = &req.system {
            prompt.push_str("[SYSTEM]\n");
            prompt.push_str(system.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str(&req.user);
        let payload = json!({
            "contents": [
                {
                    "parts": [
                        {
                            "text": prompt
                        }
                    ]
                }
            ]
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, cfg.api_key
        );
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| "gemini request failed")?
            .error_for_status()
            .context("gemini returned an error")?
            .json::<GeminiResponse>()
            .await
            .context("failed to decode gemini response")?;
        let text = response
            .candidates
            .and_then(|mut c| c.pop())
            .and_then(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .find_map(|part| part.text)
            })
            .ok_or_else(|| anyhow!("missing text in Gemini response"))?;
        let usage = response.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    fn chat_local(&self) -> LlmResponse {
        LlmResponse {
            content: LOCAL_RESPONSE.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

fn chat_messages(req: &LlmRequest) -> Vec<Value> {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": req.user }));
    messages
}

async fn decode_body(label: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(format!(
            "{label} returned error (status {}): {}",
            status, body
        )));
    }
    serde_json::from_str(&body).with_context(|| format!("failed to decode {label} response"))
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!(format!("{var} is empty")));
    }
    if var.contains("GOOGLE") && !value.starts_with("AI") {
        return Err(anyhow!(format!(
            "{} must be a valid Gemini API key (starts with 'AI...')",
            var
        )));
    }
    if var.contains("OPENROUTER") && !value.starts_with("sk-or-") {
        return Err(anyhow!(format!("{} must start with 'sk-or-'", var)));
    }
    if var.contains("HUGGING_FACE") && !value.starts_with("hf_") {
        return Err(anyhow!(format!("{} must start with 'hf_'", var)));
    }
    Ok(())
}

fn extract_chat_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let content = choice.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(str::to_string)
}

#[derive(Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Default, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_tokens: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_roundtrip() {
        for provider in [
            LlmProvider::Gemini,
            LlmProvider::Ollama,
            LlmProvider::OpenRouter,
            LlmProvider::HuggingFace,
            LlmProvider::Local,
        ] {
            assert_eq!(LlmProvider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(LlmProvider::from_str(" Gemini "), Some(LlmProvider::Gemini));
        assert_eq!(LlmProvider::from_str("openai"), None);
    }

    #[test]
    fn api_key_prefixes_are_checked() {
        assert!(validate_api_key("GOOGLE_API_KEY", "AIza-test").is_ok());
        assert!(validate_api_key("GOOGLE_API_KEY", "sk-test").is_err());
        assert!(validate_api_key("OPENROUTER_API_KEY", "sk-or-v1-abc").is_ok());
        assert!(validate_api_key("HUGGING_FACE_TOKEN", "token").is_err());
        assert!(validate_api_key("HUGGING_FACE_TOKEN", "  ").is_err());
    }

    #[test]
    fn extracts_text_from_chat_completion_shapes() {
        let plain = json!({"choices": [{"message": {"content": "{\"entities\": []}"}}]});
        assert_eq!(extract_chat_text(&plain).as_deref(), Some("{\"entities\": []}"));
        let parts = json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "hi"}]}}]
        });
        assert_eq!(extract_chat_text(&parts).as_deref(), Some("hi"));
        assert_eq!(extract_chat_text(&json!({"choices": []})), None);
    }

    #[test]
    fn local_provider_answers_without_network() {
        let client = LlmClient::new(LlmProvider::Local, "local").unwrap();
        let response = client
            .chat_blocking(&LlmRequest {
                system: None,
                user: "find PII".to_string(),
            })
            .unwrap();
        assert_eq!(response.content, LOCAL_RESPONSE);
        assert_eq!(response.total_tokens(), 0);
    }
}
