//! fluxion-chat: Orchestration Loop
//!
//! Turns a natural-language question into at most one operation dispatch and
//! a final answer:
//!
//! ```text
//! user text ─▶ first generation ─▶ TOOL_CALL block? ──no──▶ final answer
//!                                        │yes
//!                                        ▼
//!                     catalog / text-to-SQL fallback
//!                                        │
//!                                        ▼
//!                     second generation ─▶ final answer
//! ```
//!
//! # Modules
//!
//! - `agent`: the loop itself, plus streaming and direct query modes
//! - `invocation`: extraction of the `TOOL_CALL` block from model text
//! - `formatting`: tool results rendered for the model
//! - `progress`: optional stage callback
//! - `session`: per-session conversation history
//! - `system_prompt`: default instructions with the catalog embedded
//! - `text_to_sql`: fallback that asks the model for a query and sandboxes it

pub mod agent;
pub mod formatting;
pub mod invocation;
pub mod progress;
pub mod session;
pub mod system_prompt;
pub mod text_to_sql;

pub use agent::{Agent, ResponseStream, CHAT_TEMPERATURE};
pub use formatting::{format_data, format_sql_tool_result, format_tool_result};
pub use invocation::{parse_invocation, InvocationRequest};
pub use progress::{ProgressCallback, ProgressEmitter, ProgressEvent, ProgressStage};
pub use session::ConversationState;
pub use system_prompt::{build_system_prompt, describe_tools};
pub use text_to_sql::{
    build_sql_prompt, extract_sql, fallback_definition, TextToSql, FALLBACK_CATEGORY,
    FALLBACK_OPERATION, SQL_MAX_TOKENS, SQL_TEMPERATURE,
};
