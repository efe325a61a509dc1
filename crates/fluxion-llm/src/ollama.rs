//! Ollama API Client
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Generate | `{URL_BASE_OLLAMA}/api/generate` | Text generation (blocking and NDJSON stream) |
//!
//! ## Authentication
//! - Header: `X-API-Key: {KEY_OLLAMA}` (optional, for hosted gateways)
//!
//! `/api/generate` has no chat format, so conversations are flattened into a
//! `User:` / `Assistant:` transcript with the system message passed separately.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use fluxion_core::truncate_text;

use crate::lines::LineBuffer;
use crate::provider::{
    format_prompt_with_system, ChatMessage, ChatRole, GenerationOptions, LlmProvider,
    LlmResponse, ProviderType, TextStream, TokenUsage,
};

// =============================================================================
// API ENDPOINT CONFIGURATION
// =============================================================================

pub mod endpoints {
    /// Full URL: {base}/api/generate
    pub const GENERATE: &str = "/api/generate";
}

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "mistral:instruct";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const KNOWN_MODELS: &[&str] = &[
    "mistral:instruct",
    "llama2",
    "llama2:13b",
    "codellama",
    "phi",
    "neural-chat",
];

// =============================================================================
// DATA STRUCTURES
// =============================================================================

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    model: Option<String>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

// =============================================================================
// CLIENT IMPLEMENTATION
// =============================================================================

/// Ollama provider (local or remote)
pub struct OllamaProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// Falls back to `KEY_OLLAMA` / `URL_BASE_OLLAMA` when arguments are absent.
    /// A base URL is mandatory.
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.or_else(|| fluxion_core::config::get_config_opt("KEY_OLLAMA"));
        let base_url = base_url
            .or_else(|| fluxion_core::config::get_config_opt("URL_BASE_OLLAMA"))
            .ok_or_else(|| {
                anyhow!("Base URL must be provided either as argument or through URL_BASE_OLLAMA environment variable")
            })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        })
    }

    /// Create from environment with the default model
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, DEFAULT_MODEL)
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, endpoints::GENERATE)
    }

    fn build_request<'a>(
        &self,
        model: &'a str,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model,
            prompt: format_prompt_with_system(prompt, options.system_prompt.as_deref()),
            stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        }
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.endpoint());
        if let Some(ref key) = self.api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }
}

/// Flatten a conversation into a single prompt plus the (last) system message.
pub(crate) fn messages_to_prompt(messages: &[ChatMessage]) -> (String, Option<String>) {
    let mut parts = Vec::with_capacity(messages.len() + 1);
    let mut system_prompt = None;

    for msg in messages {
        match msg.role {
            ChatRole::System => system_prompt = Some(msg.content.clone()),
            ChatRole::User => parts.push(format!("User: {}", msg.content)),
            ChatRole::Assistant => parts.push(format!("Assistant: {}", msg.content)),
        }
    }

    parts.push("Assistant:".to_string());
    (parts.join("\n\n"), system_prompt)
}

/// Decode one NDJSON line of a streaming response.
///
/// Returns `None` for blank or undecodable lines, which are skipped.
pub(crate) fn parse_stream_line(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let chunk: OllamaStreamChunk = serde_json::from_str(line).ok()?;
    Some((chunk.response.unwrap_or_default(), chunk.done))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<LlmResponse> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        info!("[LLM] Making call to Ollama...");
        info!(
            "[LLM] Model: {} | Prompt length: {} chars | Preview: \"{}\"",
            model,
            prompt.len(),
            truncate_text(prompt, 30)
        );

        let request = self.build_request(model, prompt, options, false);
        debug!("Ollama request to: {}", self.endpoint());

        let response = self
            .post()
            .json(&request)
            .send()
            .await
            .context("Failed to send Ollama request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        let data: OllamaGenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let prompt_tokens = data.prompt_eval_count.unwrap_or(0);
        let completion_tokens = data.eval_count.unwrap_or(0);

        info!(
            "[LLM] Response received | Length: {} chars | Preview: \"{}\"",
            data.response.len(),
            truncate_text(&data.response, 30)
        );

        Ok(LlmResponse {
            content: data.response,
            model: data.model.unwrap_or_else(|| model.to_string()),
            finish_reason: data.done_reason,
            usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<LlmResponse> {
        let (prompt, system_prompt) = messages_to_prompt(messages);
        let mut options = options.clone();
        if system_prompt.is_some() {
            options.system_prompt = system_prompt;
        }
        self.generate(&prompt, &options).await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let request = self.build_request(model, prompt, options, true);

        let mut response = self
            .post()
            .json(&request)
            .send()
            .await
            .context("Failed to send Ollama streaming request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(100);

        tokio::spawn(async move {
            let mut lines = LineBuffer::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        lines.extend(&bytes);

                        while let Some(line) = lines.next_line() {
                            if let Some((text, done)) = parse_stream_line(&line) {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    return;
                                }
                                if done {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        let tail = lines.finish();
                        if let Some((text, _)) = tail.as_deref().and_then(parse_stream_line) {
                            if !text.is_empty() {
                                let _ = tx.send(Ok(text)).await;
                            }
                        }
                        return;
                    }
                    Err(e) => {
                        warn!("Ollama stream interrupted: {}", e);
                        let _ = tx.send(Err(anyhow!("Ollama stream error: {}", e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    fn list_models(&self) -> Vec<String> {
        KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_to_prompt() {
        let messages = vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("How many articles?"),
            ChatMessage::assistant("Let me check."),
            ChatMessage::user("Thanks"),
        ];

        let (prompt, system) = messages_to_prompt(&messages);

        assert_eq!(system.as_deref(), Some("You are helpful."));
        assert_eq!(
            prompt,
            "User: How many articles?\n\nAssistant: Let me check.\n\nUser: Thanks\n\nAssistant:"
        );
    }

    #[test]
    fn test_parse_stream_line() {
        assert_eq!(
            parse_stream_line(r#"{"response":"Hel","done":false}"#),
            Some(("Hel".to_string(), false))
        );
        assert_eq!(
            parse_stream_line(r#"{"done":true,"done_reason":"stop"}"#),
            Some((String::new(), true))
        );
        assert_eq!(parse_stream_line("   "), None);
        assert_eq!(parse_stream_line("not json"), None);
    }

    #[test]
    fn test_new_requires_base_url() {
        std::env::remove_var("URL_BASE_OLLAMA");
        let result = OllamaProvider::new(None, None, DEFAULT_MODEL);
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider = OllamaProvider::new(
            None,
            Some("http://localhost:11434/".to_string()),
            DEFAULT_MODEL,
        )
        .unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:11434/api/generate");
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
        assert_eq!(provider.provider_type(), ProviderType::Ollama);
    }

    #[test]
    fn test_request_serialization() {
        let provider =
            OllamaProvider::new(None, Some("http://x".to_string()), DEFAULT_MODEL).unwrap();
        let options = GenerationOptions::default()
            .with_temperature(0.1)
            .with_system_prompt("sys");
        let request = provider.build_request("m", "q", &options, false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "m");
        assert_eq!(json["prompt"], "sys\n\nq");
        assert_eq!(json["stream"], false);
        assert!(json["options"].get("num_predict").is_none());
    }
}
