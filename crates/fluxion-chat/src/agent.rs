//! Agent: the Orchestration Loop
//!
//! One `Agent` per session. A turn is a strictly sequential chain of awaited
//! steps:
//!
//! 1. append the user text to history
//! 2. first generation over `system + history`
//! 3. no `TOOL_CALL` block: the reply is final
//! 4. otherwise dispatch it (text-to-SQL fallback or catalog), fold the
//!    assistant reply plus the rendered result into the in-flight prompt and
//!    generate again
//! 5. append only the final answer to history
//!
//! Operation failures are folded back into the prompt as text. A model
//! backend error ends the turn and is returned to the caller.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fluxion_core::truncate_text;
use fluxion_llm::{BoxedProvider, ChatMessage, GenerationOptions, TextStream};
use fluxion_sql::SandboxExecution;
use fluxion_tools::OperationCatalog;

use crate::formatting::{format_sql_tool_result, format_tool_result};
use crate::invocation::{parse_invocation, InvocationRequest};
use crate::progress::{ProgressEmitter, ProgressStage};
use crate::session::ConversationState;
use crate::system_prompt::{build_system_prompt, describe_tools};
use crate::text_to_sql::{TextToSql, FALLBACK_OPERATION};

/// Sampling for conversation turns
pub const CHAT_TEMPERATURE: f32 = 0.3;

pub struct Agent {
    session_id: Uuid,
    provider: BoxedProvider,
    catalog: Arc<OperationCatalog>,
    text_to_sql: Option<TextToSql>,
    system_prompt: String,
    state: ConversationState,
    progress: ProgressEmitter,
}

impl Agent {
    /// Build an agent with the default system prompt rendered from `catalog`
    /// (and the fallback operation, when `text_to_sql` is given).
    pub async fn new(
        provider: BoxedProvider,
        catalog: Arc<OperationCatalog>,
        text_to_sql: Option<TextToSql>,
    ) -> Self {
        let tools_desc = describe_tools(&catalog, text_to_sql.as_ref()).await;
        Self {
            session_id: Uuid::new_v4(),
            provider,
            catalog,
            text_to_sql,
            system_prompt: build_system_prompt(&tools_desc),
            state: ConversationState::new(),
            progress: ProgressEmitter::none(),
        }
    }

    /// Replace the default system prompt
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = progress;
        self
    }

    /// Identifier tagging this session's log lines
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn catalog(&self) -> &Arc<OperationCatalog> {
        &self.catalog
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn clear_history(&mut self) {
        info!("[AGENT] Clearing {} history message(s)", self.state.len());
        self.state.clear();
    }

    /// Catalog operation names, then the fallback when configured
    pub async fn available_tools(&self) -> Vec<String> {
        let mut names = self.catalog.names().await;
        if self.text_to_sql.is_some() {
            names.push(FALLBACK_OPERATION.to_string());
        }
        names
    }

    fn chat_options(&self) -> GenerationOptions {
        GenerationOptions::default().with_temperature(CHAT_TEMPERATURE)
    }

    // ========================================================================
    // TOOL-USING TURN
    // ========================================================================

    /// Run one turn and return the final answer.
    pub async fn process_message(&mut self, user_message: &str) -> Result<String> {
        info!(
            session = %self.session_id,
            "[AGENT] Processing message: \"{}\"",
            truncate_text(user_message, 30)
        );
        self.state.push_user(user_message);

        self.progress.emit(
            ProgressStage::AnalysisStart,
            "Analyzing your question...",
            None,
        );

        let options = self.chat_options();
        let mut messages = self.state.with_system(&self.system_prompt);
        let first = self
            .provider
            .chat(&messages, &options)
            .await
            .context("Model call failed")?;
        debug!("[LLM] First reply: \"{}\"", truncate_text(&first.content, 60));

        let response_text = match parse_invocation(&first.content) {
            Some(call) => {
                let tool_message = self.dispatch(&call).await;

                messages.push(ChatMessage::assistant(first.content));
                messages.push(ChatMessage::user(tool_message));

                self.progress.emit(
                    ProgressStage::GenerationStart,
                    "Generating response...",
                    None,
                );
                let second = self
                    .provider
                    .chat(&messages, &options)
                    .await
                    .context("Model call failed")?;
                second.content
            }
            None => first.content,
        };

        self.state.push_assistant(response_text.clone());
        info!(
            "[AGENT] Response ready ({} chars, history {})",
            response_text.chars().count(),
            self.state.len()
        );
        Ok(response_text)
    }

    /// Resolve one invocation into the text folded back into the prompt.
    async fn dispatch(&self, call: &InvocationRequest) -> String {
        info!("[AGENT] Model requested tool: {}", call.name);
        self.progress.emit(
            ProgressStage::ToolExecuting,
            format!("Executing tool: {}", call.name),
            Some(json!({"tool": call.name, "arguments": call.arguments})),
        );

        if call.name == FALLBACK_OPERATION {
            if let Some(text_to_sql) = &self.text_to_sql {
                return self.dispatch_fallback(text_to_sql, call).await;
            }
        }

        let result = self
            .catalog
            .invoke(&call.name, call.arguments_value())
            .await;

        if result.success {
            self.progress.emit(
                ProgressStage::ToolSuccess,
                format!("Tool {} completed", call.name),
                Some(json!({"tool": call.name})),
            );
        } else {
            self.progress.emit(
                ProgressStage::ToolError,
                format!("Tool {} failed", call.name),
                Some(json!({"tool": call.name, "error": result.error})),
            );
        }
        format_tool_result(&result)
    }

    async fn dispatch_fallback(
        &self,
        text_to_sql: &TextToSql,
        call: &InvocationRequest,
    ) -> String {
        self.progress.emit(
            ProgressStage::SqlGenerationStart,
            "Generating SQL query...",
            call.arguments.get("question").map(|q| json!({"question": q})),
        );

        match text_to_sql.run_with_arguments(&call.arguments).await {
            Ok(execution) => {
                self.report_sql(&execution);
                if execution.success {
                    self.progress.emit(
                        ProgressStage::ToolSuccess,
                        format!("Tool {} completed", call.name),
                        Some(json!({"tool": call.name})),
                    );
                } else {
                    self.progress.emit(
                        ProgressStage::ToolError,
                        format!("Tool {} failed", call.name),
                        Some(json!({"tool": call.name, "error": execution.error()})),
                    );
                }
                format_sql_tool_result(&call.name, &execution)
            }
            Err(msg) => {
                warn!("[AGENT] {}", msg);
                self.progress.emit(
                    ProgressStage::ToolError,
                    format!("Tool {} failed", call.name),
                    Some(json!({"tool": call.name, "error": msg})),
                );
                format!("Tool '{}' failed: {}", call.name, msg)
            }
        }
    }

    fn report_sql(&self, execution: &SandboxExecution) {
        let message = if execution.success {
            format!("SQL query returned {} row(s)", execution.row_count)
        } else {
            format!(
                "SQL query failed: {}",
                execution.reason().map(|r| r.as_str()).unwrap_or("unknown")
            )
        };
        self.progress.emit(
            ProgressStage::SqlExecuted,
            message,
            Some(json!({
                "success": execution.success,
                "sql": execution.sql,
                "row_count": execution.row_count,
                "truncated": execution.truncated,
                "reason": execution.reason().map(|r| r.as_str()),
            })),
        );
    }

    // ========================================================================
    // DIRECT QUERY MODE
    // ========================================================================

    /// Answer `question` through the text-to-SQL path without operation
    /// selection. Errors become the answer text instead of propagating.
    pub async fn process_direct_query(&mut self, question: &str) -> String {
        info!(
            session = %self.session_id,
            "[AGENT] Direct query: \"{}\"",
            truncate_text(question, 30)
        );
        self.state.push_user(question);

        let answer = match self.direct_query(question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("[AGENT] Direct query failed: {:#}", e);
                format!("Error processing query: {:#}", e)
            }
        };

        self.state.push_assistant(answer.clone());
        answer
    }

    async fn direct_query(&self, question: &str) -> Result<String> {
        let text_to_sql = self
            .text_to_sql
            .as_ref()
            .ok_or_else(|| anyhow!("Text-to-SQL is not configured"))?;

        self.progress.emit(
            ProgressStage::SqlGenerationStart,
            "Generating SQL query...",
            Some(json!({"question": question})),
        );
        let execution = text_to_sql.run(question).await;
        self.report_sql(&execution);

        let mut messages = self.state.with_system(&self.system_prompt);
        messages.push(ChatMessage::user(format_sql_tool_result(
            FALLBACK_OPERATION,
            &execution,
        )));

        self.progress.emit(
            ProgressStage::GenerationStart,
            "Generating response...",
            None,
        );
        let reply = self
            .provider
            .chat(&messages, &self.chat_options())
            .await
            .context("Model call failed")?;
        Ok(reply.content)
    }

    // ========================================================================
    // STREAMING
    // ========================================================================

    /// Stream a reply without invocation detection.
    ///
    /// The concatenated chunks are committed to history once the stream is
    /// drained. A stream dropped early or ending in an error commits nothing.
    pub async fn stream_response(&mut self, user_message: &str) -> Result<ResponseStream<'_>> {
        info!(
            session = %self.session_id,
            "[AGENT] Streaming reply to: \"{}\"",
            truncate_text(user_message, 30)
        );
        self.state.push_user(user_message);

        self.progress.emit(
            ProgressStage::GenerationStart,
            "Generating response...",
            None,
        );
        let options = self
            .chat_options()
            .with_system_prompt(self.system_prompt.clone());
        let rx = self
            .provider
            .stream_generate(user_message, &options)
            .await
            .context("Model stream failed")?;

        Ok(ResponseStream {
            agent: self,
            rx,
            buffer: String::new(),
            finished: false,
        })
    }
}

/// Chunks of a streamed reply, borrowed from the owning [`Agent`]
pub struct ResponseStream<'a> {
    agent: &'a mut Agent,
    rx: TextStream,
    buffer: String,
    finished: bool,
}

impl ResponseStream<'_> {
    /// Next fragment; `None` once the reply has been committed.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(chunk)) => {
                self.buffer.push_str(&chunk);
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.finished = true;
                warn!("[AGENT] Stream aborted: {:#}", e);
                Some(Err(e))
            }
            None => {
                self.finished = true;
                let full = std::mem::take(&mut self.buffer);
                debug!("[AGENT] Stream complete ({} chars)", full.chars().count());
                self.agent.state.push_assistant(full);
                None
            }
        }
    }

    /// Drain the stream and return the full reply.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut full = String::new();
        while let Some(chunk) = self.next_chunk().await {
            full.push_str(&chunk?);
        }
        Ok(full)
    }
}
