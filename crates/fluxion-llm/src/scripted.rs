//! Scripted provider
//!
//! Replays queued replies in order and records every request it receives.
//! Used by tests and by offline demos where no model server is reachable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::provider::{
    ChatMessage, GenerationOptions, LlmProvider, LlmResponse, ProviderType, TextStream,
};

/// A request observed by [`ScriptedProvider`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Conversation passed to `chat`, or a single user message for `generate`
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub streamed: bool,
}

enum Reply {
    Text(String),
    Failure(String),
}

/// Provider that answers from a fixed script
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
    chunk_size: usize,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            chunk_size: 8,
        }
    }

    /// Provider preloaded with `replies`, returned in order
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    /// Size of the fragments produced by `stream_generate`
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Reply::Text(reply.into()));
        }
    }

    /// Queue a backend failure, as a network error would surface
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Reply::Failure(message.into()));
        }
    }

    /// Number of model calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Snapshot of every recorded request
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, messages: Vec<ChatMessage>, options: &GenerationOptions, streamed: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages,
                temperature: options.temperature,
                max_tokens: options.max_tokens,
                system_prompt: options.system_prompt.clone(),
                streamed,
            });
        }
    }

    fn next_reply(&self) -> Result<String> {
        let reply = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted provider lock poisoned"))?
            .pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Failure(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted provider has no reply queued")),
        }
    }

    fn respond(&self, content: String) -> LlmResponse {
        LlmResponse {
            content,
            model: "scripted".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: None,
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<LlmResponse> {
        self.record(vec![ChatMessage::user(prompt)], options, false);
        Ok(self.respond(self.next_reply()?))
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<LlmResponse> {
        self.record(messages.to_vec(), options, false);
        Ok(self.respond(self.next_reply()?))
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        self.record(vec![ChatMessage::user(prompt)], options, true);
        let text = self.next_reply()?;

        let chars: Vec<char> = text.chars().collect();
        let (tx, rx) = tokio::sync::mpsc::channel(chars.len() / self.chunk_size + 1);
        for piece in chars.chunks(self.chunk_size) {
            let _ = tx.try_send(Ok(piece.iter().collect()));
        }
        Ok(rx)
    }

    fn list_models(&self) -> Vec<String> {
        vec!["scripted".to_string()]
    }
}
