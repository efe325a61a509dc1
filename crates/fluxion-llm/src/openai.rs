//! OpenAI-compatible API Client
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Base URL | `https://api.openai.com/v1` | Overridable through `URL_BASE_OPENAI` |
//! | Chat | `/chat/completions` | Chat completions (blocking and SSE stream) |
//!
//! ## Authentication
//! - Header: `Authorization: Bearer {KEY_OPENAI}`
//! - Environment: `KEY_OPENAI`

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use fluxion_core::config::DEFAULT_OPENAI_URL;
use fluxion_core::truncate_text;

use crate::lines::LineBuffer;
use crate::provider::{
    ChatMessage, GenerationOptions, LlmProvider, LlmResponse, ProviderType, TextStream,
    TokenUsage,
};

// =============================================================================
// API ENDPOINT CONFIGURATION
// =============================================================================

pub mod endpoints {
    /// Full URL: {base}/chat/completions
    pub const CHAT_COMPLETIONS: &str = "/chat/completions";
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const KNOWN_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

// =============================================================================
// DATA STRUCTURES
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: Option<String>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// One decoded server-sent event line
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Text(String),
    Done,
    Skip,
}

// =============================================================================
// CLIENT IMPLEMENTATION
// =============================================================================

/// OpenAI (or compatible) chat completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    ///
    /// The API key falls back to `KEY_OPENAI` and is mandatory.
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key
            .or_else(|| fluxion_core::config::get_config_opt("KEY_OPENAI"))
            .ok_or_else(|| {
                anyhow!("API key must be provided either as argument or through KEY_OPENAI environment variable")
            })?;
        let base_url = base_url
            .or_else(|| fluxion_core::config::get_config_opt("URL_BASE_OPENAI"))
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(None, None, DEFAULT_MODEL)
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, endpoints::CHAT_COMPLETIONS)
    }

    fn build_request<'a>(
        &self,
        model: &'a str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        stream: bool,
    ) -> OpenAiRequest<'a> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(ref system) = options.system_prompt {
            wire.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        wire.extend(messages.iter().map(|m| OpenAiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        OpenAiRequest {
            model,
            messages: wire,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
        }
    }

    async fn send(&self, request: &OpenAiRequest<'_>) -> Result<reqwest::Response> {
        let url = self.endpoint();
        debug!("OpenAI request to: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send OpenAI request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, body));
        }
        Ok(response)
    }
}

/// Decode one line of an SSE chat completion stream.
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty())
            .map(SseLine::Text)
            .unwrap_or(SseLine::Skip),
        Err(_) => SseLine::Skip,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<LlmResponse> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<LlmResponse> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        info!(
            "[LLM] OpenAI chat: model={}, messages={}, endpoint={}",
            model,
            messages.len(),
            self.base_url
        );

        let request = self.build_request(model, messages, options, false);
        let result: OpenAiResponse = self
            .send(&request)
            .await?
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No response from OpenAI"))?;

        info!(
            "[LLM] Response received | Length: {} chars | Preview: \"{}\"",
            choice.message.content.len(),
            truncate_text(&choice.message.content, 30)
        );

        Ok(LlmResponse {
            content: choice.message.content,
            model: result.model.unwrap_or_else(|| model.to_string()),
            finish_reason: choice.finish_reason,
            usage: result.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let request = self.build_request(model, &[ChatMessage::user(prompt)], options, true);
        let mut response = self.send(&request).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(100);

        tokio::spawn(async move {
            let mut lines = LineBuffer::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        lines.extend(&bytes);
                        while let Some(line) = lines.next_line() {
                            match parse_sse_line(&line) {
                                SseLine::Text(text) => {
                                    if tx.send(Ok(text)).await.is_err() {
                                        return;
                                    }
                                }
                                SseLine::Done => return,
                                SseLine::Skip => {}
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!("OpenAI stream interrupted: {}", e);
                        let _ = tx.send(Err(anyhow!("OpenAI stream error: {}", e))).await;
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

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(
            Some("sk-test".to_string()),
            Some("https://example.test/v1/".to_string()),
            DEFAULT_MODEL,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            SseLine::Text("Hi".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
    }

    #[test]
    fn test_endpoint() {
        let p = provider();
        assert_eq!(p.endpoint(), "https://example.test/v1/chat/completions");
        assert_eq!(p.provider_type(), ProviderType::OpenAI);
        assert!(p.list_models().contains(&"gpt-4o-mini".to_string()));
    }

    #[test]
    fn test_request_prepends_system_prompt() {
        let p = provider();
        let options = GenerationOptions::default()
            .with_system_prompt("be terse")
            .with_max_tokens(500);
        let request = p.build_request("gpt-4o", &[ChatMessage::user("hi")], &options, false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be terse");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 500);
        assert!(json.get("stream").is_none());
    }
}
