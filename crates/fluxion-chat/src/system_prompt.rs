//! Default system prompt
//!
//! Embeds the catalog description and teaches the model the invocation
//! block format parsed by [`crate::invocation`].

use fluxion_tools::OperationCatalog;

use crate::text_to_sql::TextToSql;

/// Instructions around `tools_desc`
pub fn build_system_prompt(tools_desc: &str) -> String {
    format!(
        r#"You are a helpful AI assistant with access to a database of approved news articles.

You have access to the following tools to query the ArticleApproveds database:

{tools_desc}

When a user asks a question that requires querying the database, you should:

1. Determine which tool(s) would help answer the question
2. Respond with a tool call in this EXACT format:
   TOOL_CALL: tool_name
   ARGUMENTS:
   {{
     "param1": "value1",
     "param2": value2
   }}
   END_TOOL_CALL

3. After receiving tool results, use them to answer the user's question in a helpful way

If the user's question doesn't require database queries, answer directly.

Be concise, accurate, and helpful. When presenting article results, format them clearly.
"#
    )
}

/// Catalog description, plus the fallback operation when one is wired in
pub async fn describe_tools(catalog: &OperationCatalog, fallback: Option<&TextToSql>) -> String {
    let mut desc = catalog.describe_all().await;
    if let Some(fallback) = fallback {
        if catalog.is_empty().await {
            desc = fallback.definition().describe();
        } else {
            desc.push_str("\n\n");
            desc.push_str(&fallback.definition().describe());
        }
    }
    desc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_description_and_format() {
        let prompt = build_system_prompt("Tool: count_approved_articles");
        assert!(prompt.starts_with("You are a helpful AI assistant"));
        assert!(prompt.contains("ArticleApproveds database:\n\nTool: count_approved_articles\n\nWhen a user"));
        assert!(prompt.contains("   TOOL_CALL: tool_name\n   ARGUMENTS:\n   {\n"));
        assert!(prompt.contains("   END_TOOL_CALL\n"));
        assert!(prompt.ends_with("format them clearly.\n"));
    }

    #[tokio::test]
    async fn test_empty_catalog_description() {
        let catalog = OperationCatalog::new();
        assert_eq!(describe_tools(&catalog, None).await, "No tools available.");
    }
}
