//! Tool results rendered for the model
//!
//! The rendered text becomes the user-role message folded into the second
//! generation of a turn.

use serde_json::Value;

use fluxion_sql::{format_sql_results, SandboxExecution};
use fluxion_tools::builtin::{
    format_article_for_display, format_articles_list, is_article, DEFAULT_MAX_DISPLAY,
};
use fluxion_tools::InvocationResult;

/// Article rows get the article formatter, other structured data is pretty
/// JSON, scalars are shown as-is.
pub fn format_data(data: &Value) -> String {
    match data {
        Value::Array(items) if items.first().is_some_and(is_article) => {
            format_articles_list(items, DEFAULT_MAX_DISPLAY)
        }
        Value::Object(obj) if is_article(data) => format_article_for_display(obj),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_tool_result(result: &InvocationResult) -> String {
    if result.success {
        let formatted = result.data.as_ref().map(format_data).unwrap_or_default();
        success_message(&result.tool_name, &formatted)
    } else {
        failure_message(
            &result.tool_name,
            result.error.as_deref().unwrap_or("unknown error"),
        )
    }
}

/// Same framing for a text-to-SQL execution
pub fn format_sql_tool_result(tool_name: &str, execution: &SandboxExecution) -> String {
    let formatted = format_sql_results(execution);
    if execution.success {
        success_message(tool_name, &formatted)
    } else {
        failure_message(tool_name, &formatted)
    }
}

fn success_message(tool_name: &str, formatted: &str) -> String {
    format!(
        "Tool '{}' executed successfully.\n\nResult:\n{}",
        tool_name, formatted
    )
}

fn failure_message(tool_name: &str, error: &str) -> String {
    format!("Tool '{}' failed: {}", tool_name, error)
}
