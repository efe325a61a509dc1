//! Operation Catalog
//!
//! Explicitly constructed registry of operations, handed to the agent at
//! construction time. Registration order is kept so the catalog description
//! rendered into the system prompt is deterministic.
//!
//! `invoke` never fails: unknown names, missing required arguments, handler
//! errors and handler panics all come back as an unsuccessful
//! [`InvocationResult`].

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fluxion_core::truncate_text;

use crate::tool::{Arguments, BoxedOperation, FnOperation, OperationDefinition};

/// Outcome of a catalog invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub tool_name: String,
}

impl InvocationResult {
    pub fn ok(tool_name: &str, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            tool_name: tool_name.to_string(),
        }
    }

    pub fn failure(tool_name: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            tool_name: tool_name.to_string(),
        }
    }
}

#[derive(Default)]
struct CatalogInner {
    order: Vec<String>,
    operations: HashMap<String, BoxedOperation>,
}

/// Operation Catalog
#[derive(Default)]
pub struct OperationCatalog {
    inner: RwLock<CatalogInner>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation; an existing one with the same name is replaced
    /// in place.
    pub async fn register(&self, operation: BoxedOperation) {
        let name = operation.name().to_string();
        let mut inner = self.inner.write().await;
        if inner.operations.insert(name.clone(), operation).is_some() {
            debug!("Replaced operation: {}", name);
        } else {
            debug!("Registered operation: {}", name);
            inner.order.push(name);
        }
    }

    /// Register a blocking closure as an operation
    pub async fn register_fn<F>(&self, definition: OperationDefinition, handler: F)
    where
        F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnOperation::new(definition, handler)))
            .await
    }

    pub async fn get(&self, name: &str) -> Option<BoxedOperation> {
        self.inner.read().await.operations.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.operations.contains_key(name)
    }

    /// Definitions in registration order
    pub async fn list(&self) -> Vec<OperationDefinition> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| inner.operations.get(name))
            .map(|op| op.definition().clone())
            .collect()
    }

    pub async fn list_by_category(&self, category: &str) -> Vec<OperationDefinition> {
        self.list()
            .await
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Human-readable description of every operation, for the system prompt.
    pub async fn describe_all(&self) -> String {
        let definitions = self.list().await;
        if definitions.is_empty() {
            return "No tools available.".to_string();
        }
        definitions
            .iter()
            .map(OperationDefinition::describe)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub async fn to_json(&self) -> Value {
        Value::Array(self.list().await.iter().map(|d| d.to_json()).collect())
    }

    /// Invoke `name` with model-supplied arguments.
    ///
    /// Keys not declared by the operation are dropped, absent optional keys
    /// with a default are filled in, and a missing required key fails the call.
    pub async fn invoke(&self, name: &str, args: Value) -> InvocationResult {
        let Some(operation) = self.get(name).await else {
            warn!("[TOOL] Tool '{}' not found", name);
            return InvocationResult::failure(name, format!("Tool '{}' not found", name));
        };

        let args = match prepare_arguments(operation.definition(), args) {
            Ok(args) => args,
            Err(error) => {
                warn!("[TOOL] {}", error);
                return InvocationResult::failure(name, error);
            }
        };

        info!(
            "[TOOL] Executing tool: {} | Args: {}",
            name,
            truncate_text(&serde_json::Value::Object(args.clone()).to_string(), 80)
        );

        match AssertUnwindSafe(operation.execute(args)).catch_unwind().await {
            Ok(Ok(data)) => {
                info!("[TOOL] Tool '{}' completed successfully", name);
                InvocationResult::ok(name, data)
            }
            Ok(Err(e)) => {
                warn!("[TOOL] Tool '{}' failed: {}", name, e);
                InvocationResult::failure(name, e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "operation panicked".to_string());
                warn!("[TOOL] Tool '{}' panicked: {}", name, message);
                InvocationResult::failure(name, message)
            }
        }
    }
}

fn prepare_arguments(definition: &OperationDefinition, args: Value) -> Result<Arguments, String> {
    let supplied = match args {
        Value::Object(map) => map,
        Value::Null => Arguments::new(),
        other => {
            debug!("Ignoring non-object arguments for {}: {}", definition.name, other);
            Arguments::new()
        }
    };

    let mut filtered = Arguments::new();
    for (key, value) in supplied {
        if definition.parameter(&key).is_some() {
            filtered.insert(key, value);
        } else {
            debug!("Dropping undeclared argument '{}' for {}", key, definition.name);
        }
    }

    for param in &definition.parameters {
        if filtered.contains_key(&param.name) {
            continue;
        }
        if param.required {
            return Err(format!(
                "Missing required parameter '{}' for tool '{}'",
                param.name, definition.name
            ));
        }
        if let Some(ref default) = param.default {
            filtered.insert(param.name.clone(), default.clone());
        }
    }

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{AsyncFnOperation, ParamType, Parameter};
    use serde_json::json;

    fn echo_definition(name: &str, category: &str) -> OperationDefinition {
        OperationDefinition::new(name, "Echo arguments", category)
            .param(Parameter::required("text", ParamType::String, "Text"))
            .param(
                Parameter::optional("limit", ParamType::Integer, "Limit").with_default(json!(10)),
            )
            .param(Parameter::optional("after", ParamType::String, "Cursor"))
    }

    async fn catalog() -> OperationCatalog {
        let catalog = OperationCatalog::new();
        catalog
            .register_fn(echo_definition("echo", "general"), |args| {
                Ok(Value::Object(args))
            })
            .await;
        catalog
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let catalog = catalog().await;
        let result = catalog.invoke("missing_tool", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'missing_tool' not found"));
        assert!(result.data.is_none());
    }

    #[tokio::test]
    async fn test_filters_and_fills_arguments() {
        let catalog = catalog().await;
        let result = catalog
            .invoke("echo", json!({"text": "hi", "bogus": 1, "verbose": true}))
            .await;

        assert!(result.success);
        assert_eq!(result.tool_name, "echo");
        assert_eq!(result.data, Some(json!({"text": "hi", "limit": 10})));
    }

    #[tokio::test]
    async fn test_explicit_argument_beats_default() {
        let catalog = catalog().await;
        let result = catalog
            .invoke("echo", json!({"text": "hi", "limit": 3, "after": "x"}))
            .await;
        assert_eq!(result.data, Some(json!({"text": "hi", "limit": 3, "after": "x"})));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let catalog = catalog().await;
        let result = catalog.invoke("echo", json!({"limit": 2})).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Missing required parameter 'text' for tool 'echo'")
        );
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_captured() {
        let catalog = OperationCatalog::new();
        catalog
            .register_fn(OperationDefinition::new("fails", "d", "c"), |_| {
                Err(anyhow::anyhow!("database is locked"))
            })
            .await;
        catalog
            .register_fn(OperationDefinition::new("panics", "d", "c"), |_| {
                panic!("index out of bounds")
            })
            .await;

        let failed = catalog.invoke("fails", json!({})).await;
        assert_eq!(failed.error.as_deref(), Some("database is locked"));

        let panicked = catalog.invoke("panics", Value::Null).await;
        assert!(!panicked.success);
        assert_eq!(panicked.error.as_deref(), Some("index out of bounds"));
    }

    #[tokio::test]
    async fn test_async_operation() {
        let catalog = OperationCatalog::new();
        catalog
            .register(Arc::new(AsyncFnOperation::new(
                OperationDefinition::new("later", "d", "c"),
                |_| async { Ok(json!(7)) },
            )))
            .await;
        assert_eq!(catalog.invoke("later", json!({})).await.data, Some(json!(7)));
    }

    #[tokio::test]
    async fn test_describe_all_is_ordered_and_stable() {
        let catalog = OperationCatalog::new();
        assert_eq!(catalog.describe_all().await, "No tools available.");

        for (name, category) in [("zeta", "b"), ("alpha", "a"), ("mid", "b")] {
            catalog
                .register_fn(echo_definition(name, category), |args| Ok(Value::Object(args)))
                .await;
        }

        let first = catalog.describe_all().await;
        assert_eq!(first, catalog.describe_all().await);
        let positions: Vec<usize> = ["Tool: zeta", "Tool: alpha", "Tool: mid"]
            .iter()
            .map(|needle| first.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(first.matches("\n\nTool: ").count(), 2);
    }

    #[tokio::test]
    async fn test_reregistration_replaces_in_place() {
        let catalog = OperationCatalog::new();
        catalog
            .register_fn(OperationDefinition::new("a", "first", "x"), |_| Ok(json!(1)))
            .await;
        catalog
            .register_fn(OperationDefinition::new("b", "other", "y"), |_| Ok(json!(2)))
            .await;
        catalog
            .register_fn(OperationDefinition::new("a", "second", "x"), |_| Ok(json!(3)))
            .await;

        assert_eq!(catalog.names().await, vec!["a", "b"]);
        assert_eq!(catalog.len().await, 2);
        assert_eq!(catalog.invoke("a", json!({})).await.data, Some(json!(3)));
        assert_eq!(catalog.list_by_category("y").await.len(), 1);
        assert_eq!(catalog.to_json().await[0]["description"], "second");
    }
}
