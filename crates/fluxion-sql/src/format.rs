//! Rendering of sandbox results for the model

use serde_json::Value;
use std::fmt::Write;

use fluxion_core::truncate_chars;

use crate::sandbox::SandboxExecution;

const MAX_DISPLAY_ROWS: usize = 10;
const MAX_VALUE_CHARS: usize = 100;

/// Render a sandbox execution as plain text.
pub fn format_sql_results(results: &SandboxExecution) -> String {
    if !results.success {
        let mut output = format!("Query failed: {}", results.error().unwrap_or("unknown error"));
        if let Some(ref sql) = results.sql {
            let _ = write!(output, "\n\nGenerated SQL:\n```sql\n{}\n```", sql);
        }
        return output;
    }

    let data = &results.data;
    let mut output = format!(
        "Query executed successfully. Found {} result(s).\n\n",
        results.row_count
    );

    if results.truncated {
        let _ = write!(
            output,
            "⚠️ {}\n\n",
            results.warning.as_deref().unwrap_or("Results truncated")
        );
    }

    let _ = write!(
        output,
        "Generated SQL:\n```sql\n{}\n```\n\n",
        results.sql.as_deref().unwrap_or_default()
    );

    match data.as_slice() {
        [] => output.push_str("No results found."),
        [row] if row.len() == 1 => {
            if let Some(value) = row.values().next() {
                let _ = write!(output, "Result: {}", display_value(value));
            }
        }
        _ => {
            output.push_str("Results:\n");
            for (i, row) in data.iter().take(MAX_DISPLAY_ROWS).enumerate() {
                let _ = writeln!(output, "\n--- Row {} ---", i + 1);
                for (key, value) in row {
                    let shown = match value {
                        Value::String(s) => truncate_chars(s, MAX_VALUE_CHARS),
                        other => display_value(other),
                    };
                    let _ = writeln!(output, "{}: {}", key, shown);
                }
            }
            if data.len() > MAX_DISPLAY_ROWS {
                let _ = write!(
                    output,
                    "\n... and {} more row(s)",
                    data.len() - MAX_DISPLAY_ROWS
                );
            }
        }
    }

    output
}

/// Scalar rendering: strings unquoted, NULL spelled out.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
