//! Progress reporting
//!
//! The agent reports what it is doing through an optional callback. Events
//! are advisory: a missing callback, a full channel or a panicking callback
//! never changes the outcome of a turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Stage of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    AnalysisStart,
    ToolExecuting,
    ToolSuccess,
    ToolError,
    SqlGenerationStart,
    SqlExecuted,
    GenerationStart,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::AnalysisStart => "analysis_start",
            ProgressStage::ToolExecuting => "tool_executing",
            ProgressStage::ToolSuccess => "tool_success",
            ProgressStage::ToolError => "tool_error",
            ProgressStage::SqlGenerationStart => "sql_generation_start",
            ProgressStage::SqlExecuted => "sql_executed",
            ProgressStage::GenerationStart => "generation_start",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Optional sink for [`ProgressEvent`]s
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    callback: Option<ProgressCallback>,
}

impl ProgressEmitter {
    /// Emitter that drops every event
    pub fn none() -> Self {
        Self { callback: None }
    }

    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Forward events into a channel, for consumers that poll
    pub fn from_sender(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self::new(move |event| {
            let _ = tx.send(event);
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }

    pub fn emit(&self, stage: ProgressStage, message: impl Into<String>, details: Option<Value>) {
        let Some(callback) = &self.callback else {
            return;
        };
        let event = ProgressEvent {
            stage,
            message: message.into(),
            details,
            timestamp: Utc::now(),
        };
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!("[AGENT] Progress callback panicked at stage {}", stage);
        }
    }
}

impl fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
