//! Core Operation trait and types
//!
//! An operation is a named, parameterised unit of work the model can ask for.
//! Its [`OperationDefinition`] is what the model sees; the behaviour behind it
//! may be synchronous ([`FnOperation`]) or asynchronous ([`AsyncFnOperation`]).

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Keyword arguments passed to an operation
pub type Arguments = Map<String, Value>;

/// Declared parameter type. Informational: the catalog does not coerce or
/// check values against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    /// Filled in when the argument is absent; `None` leaves it absent
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = if default.is_null() { None } else { Some(default) };
        self
    }

    fn describe(&self) -> String {
        let req = if self.required { "required" } else { "optional" };
        let default = self
            .default
            .as_ref()
            .map(|d| format!(", default={}", d))
            .unwrap_or_default();
        format!(
            "  - {} ({}, {}{}): {}",
            self.name, self.param_type, req, default, self.description
        )
    }
}

/// Everything about an operation except its behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: Vec<Parameter>,
}

impl OperationDefinition {
    pub fn new(name: &str, description: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Text block embedded in the system prompt.
    pub fn describe(&self) -> String {
        let params = if self.parameters.is_empty() {
            "  (no parameters)".to_string()
        } else {
            self.parameters
                .iter()
                .map(Parameter::describe)
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Tool: {}\nCategory: {}\nDescription: {}\nParameters:\n{}",
            self.name, self.category, self.description, params
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "category": self.category,
            "parameters": self.parameters,
        })
    }
}

/// Core trait for all operations
#[async_trait]
pub trait Operation: Send + Sync {
    fn definition(&self) -> &OperationDefinition;

    /// Run with arguments already filtered to declared parameter names
    async fn execute(&self, args: Arguments) -> Result<Value>;

    fn name(&self) -> &str {
        &self.definition().name
    }
}

/// Type alias for shared operations
pub type BoxedOperation = Arc<dyn Operation>;

type SyncHandler = Arc<dyn Fn(Arguments) -> Result<Value> + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Operation backed by a blocking closure, run on the blocking thread pool
#[derive(Clone)]
pub struct FnOperation {
    definition: OperationDefinition,
    handler: SyncHandler,
}

impl FnOperation {
    pub fn new<F>(definition: OperationDefinition, handler: F) -> Self
    where
        F: Fn(Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Operation for FnOperation {
    fn definition(&self) -> &OperationDefinition {
        &self.definition
    }

    async fn execute(&self, args: Arguments) -> Result<Value> {
        let handler = Arc::clone(&self.handler);
        match tokio::task::spawn_blocking(move || handler(args)).await {
            Ok(result) => result,
            // Re-raise so the catalog reports the handler's own panic message.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(anyhow::anyhow!("Operation '{}' was cancelled: {}", self.name(), e)),
        }
    }
}

/// Operation backed by an async closure
#[derive(Clone)]
pub struct AsyncFnOperation {
    definition: OperationDefinition,
    handler: AsyncHandler,
}

impl AsyncFnOperation {
    pub fn new<F, Fut>(definition: OperationDefinition, handler: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            definition,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Operation for AsyncFnOperation {
    fn definition(&self) -> &OperationDefinition {
        &self.definition
    }

    async fn execute(&self, args: Arguments) -> Result<Value> {
        (self.handler)(args).await
    }
}
