//! Invocation parsing
//!
//! The model asks for an operation by embedding a block in its reply:
//!
//! ```text
//! TOOL_CALL: search_approved_articles
//! ARGUMENTS:
//! {"search_text": "safety", "limit": 5}
//! END_TOOL_CALL
//! ```
//!
//! Only the first block is honoured. A block whose argument text is not a
//! JSON object counts as no invocation at all.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

lazy_static! {
    static ref INVOCATION_RE: Regex =
        Regex::new(r"(?s)TOOL_CALL:\s*(\w+)\s*ARGUMENTS:\s*(\{.*?\})\s*END_TOOL_CALL")
            .expect("valid regex");
}

/// Operation name and arguments requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

/// Extract the first invocation block from model output.
pub fn parse_invocation(text: &str) -> Option<InvocationRequest> {
    let cap = INVOCATION_RE.captures(text)?;
    let name = cap.get(1)?.as_str().trim().to_string();
    let raw_args = cap.get(2)?.as_str();

    match serde_json::from_str::<Map<String, Value>>(raw_args) {
        Ok(arguments) => {
            info!("Extracted tool call: {} with {} argument(s)", name, arguments.len());
            Some(InvocationRequest { name, arguments })
        }
        Err(e) => {
            debug!("Ignoring tool call block for {} with malformed arguments: {}", name, e);
            None
        }
    }
}
