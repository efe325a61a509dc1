//! Text-to-SQL fallback
//!
//! When no catalog operation fits, the model may invoke
//! [`FALLBACK_OPERATION`] with the user's question. The question and the
//! schema reference document go into a dedicated prompt, the reply is mined
//! for a single query, and that query runs through the [`QuerySandbox`].
//!
//! The schema document is read on every invocation. Without it no fallback
//! query is generated at all.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use fluxion_core::truncate_text;
use fluxion_llm::{BoxedProvider, GenerationOptions};
use fluxion_sql::{FailureReason, QuerySandbox, SandboxExecution};
use fluxion_tools::{args, OperationDefinition, ParamType, Parameter};

pub const FALLBACK_OPERATION: &str = "execute_custom_sql";
pub const FALLBACK_CATEGORY: &str = "database";

/// Sampling for query generation
pub const SQL_TEMPERATURE: f32 = 0.1;
pub const SQL_MAX_TOKENS: u32 = 500;

lazy_static! {
    static ref FENCED_SQL_RE: Regex =
        Regex::new(r"(?is)```(?:sql)?\s*(.*?)\s*```").expect("valid regex");
    static ref BARE_SQL_RE: Regex =
        Regex::new(r"(?is)((?:WITH|SELECT)\s+.*?)(?:\n\n|$)").expect("valid regex");
    static ref TRAILING_SEMICOLON_RE: Regex = Regex::new(r";\s*$").expect("valid regex");
}

/// Catalog-style definition of the fallback, rendered into the system prompt
pub fn fallback_definition() -> OperationDefinition {
    OperationDefinition::new(
        FALLBACK_OPERATION,
        "Generate and execute a custom SQL query to answer questions that cannot be \
         answered by existing tools. Use this as a fallback when no other tool fits the \
         user's question. The system will generate appropriate SQL based on the question \
         and database schema.",
        FALLBACK_CATEGORY,
    )
    .param(Parameter::required(
        "question",
        ParamType::String,
        "Natural language question to answer using SQL query",
    ))
}

/// Pull a single query out of model output.
///
/// A fenced block wins; otherwise the first bare `SELECT`/`WITH` statement up
/// to a blank line, without its trailing semicolon.
pub fn extract_sql(response: &str) -> Option<String> {
    if let Some(cap) = FENCED_SQL_RE.captures(response) {
        let sql = cap.get(1)?.as_str().trim();
        return (!sql.is_empty()).then(|| sql.to_string());
    }

    let cap = BARE_SQL_RE.captures(response)?;
    let sql = cap.get(1)?.as_str().trim();
    let sql = TRAILING_SEMICOLON_RE.replace(sql, "");
    (!sql.is_empty()).then(|| sql.into_owned())
}

pub fn build_sql_prompt(schema: &str, question: &str) -> String {
    format!(
        r#"You are a SQL expert. Given the following database schema and a user question, generate a SQL query to answer the question.

DATABASE SCHEMA:
{schema}

USER QUESTION: {question}

INSTRUCTIONS:
1. Generate a SELECT query only (no INSERT, UPDATE, DELETE, etc.)
2. Use proper SQLite syntax
3. Include appropriate WHERE clauses, JOINs, and aggregations as needed
4. Return ONLY the SQL query in a code block, no explanation
5. Ensure the query is efficient and answers the question directly

SQL QUERY:
"#
    )
}

/// Generate-and-run query component
pub struct TextToSql {
    provider: BoxedProvider,
    sandbox: Arc<QuerySandbox>,
    schema_path: PathBuf,
    definition: OperationDefinition,
}

impl TextToSql {
    pub fn new(
        provider: BoxedProvider,
        sandbox: Arc<QuerySandbox>,
        schema_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            sandbox,
            schema_path: schema_path.into(),
            definition: fallback_definition(),
        }
    }

    pub fn definition(&self) -> &OperationDefinition {
        &self.definition
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    pub fn sandbox(&self) -> &QuerySandbox {
        &self.sandbox
    }

    async fn load_schema(&self) -> Result<String, String> {
        match tokio::fs::read_to_string(&self.schema_path).await {
            Ok(schema) => Ok(schema),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(format!(
                "SQL schema not found at {}. This file is required for Text-to-SQL functionality.",
                self.schema_path.display()
            )),
            Err(e) => Err(format!(
                "Failed to read SQL schema at {}: {}",
                self.schema_path.display(),
                e
            )),
        }
    }

    /// Answer `question` with a model-written query.
    ///
    /// Never fails: every problem comes back as an unsuccessful
    /// [`SandboxExecution`] carrying its reason code.
    pub async fn run(&self, question: &str) -> SandboxExecution {
        let schema = match self.load_schema().await {
            Ok(schema) => schema,
            Err(msg) => {
                warn!("[SQL] {}", msg);
                return SandboxExecution::failed(FailureReason::SchemaNotFound, msg);
            }
        };

        info!("[SQL] Generating query for: \"{}\"", truncate_text(question, 60));
        let prompt = build_sql_prompt(&schema, question);
        let options = GenerationOptions::default()
            .with_temperature(SQL_TEMPERATURE)
            .with_max_tokens(SQL_MAX_TOKENS);

        let response = match self.provider.generate(&prompt, &options).await {
            Ok(response) => response,
            Err(e) => {
                warn!("[SQL] Query generation failed: {:#}", e);
                return SandboxExecution::failed(
                    FailureReason::UnexpectedError,
                    format!("Unexpected error: {:#}", e),
                );
            }
        };

        let Some(sql) = extract_sql(&response.content) else {
            warn!("[SQL] No query found in model output");
            debug!("[SQL] Model output: {}", response.content);
            return SandboxExecution::failed(
                FailureReason::SqlExtractionFailed,
                "Could not extract SQL query from LLM response",
            )
            .with_model_output(response.content);
        };

        debug!("[SQL] Extracted query: {}", sql);
        self.sandbox.execute(&sql).await
    }

    /// Run from invocation arguments; only `question` is read.
    pub async fn run_with_arguments(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<SandboxExecution, String> {
        match args::opt_str(arguments, "question") {
            Ok(Some(question)) => Ok(self.run(&question).await),
            Ok(None) => Err(format!(
                "Missing required parameter 'question' for tool '{}'",
                FALLBACK_OPERATION
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}
