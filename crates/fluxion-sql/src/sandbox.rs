//! Query Sandbox
//!
//! Validates a candidate query and, only if every layer passes, runs it on a
//! [`ReadOnlyDatabase`] with a hard row cap. Nothing in here returns an error
//! to the caller: rejections and engine failures are values on
//! [`SandboxExecution`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use fluxion_core::truncate_text;

use crate::connection::{ReadOnlyDatabase, Row};
use crate::validation::{validate_query, SandboxLimits, ValidationOutcome, ValidationReason};

/// Failure classes reported by the sandbox and the text-to-SQL path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Rejected by a validation layer before reaching the database
    Security(ValidationReason),
    SchemaNotFound,
    SqlExtractionFailed,
    DatabaseError,
    UnexpectedError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Security(reason) => reason.as_str(),
            FailureReason::SchemaNotFound => "schema_not_found",
            FailureReason::SqlExtractionFailed => "sql_extraction_failed",
            FailureReason::DatabaseError => "database_error",
            FailureReason::UnexpectedError => "unexpected_error",
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, FailureReason::Security(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxFailure {
    pub reason: FailureReason,
    pub error: String,
}

/// Outcome of one sandboxed query
#[derive(Debug, Clone, Serialize)]
pub struct SandboxExecution {
    pub success: bool,
    /// Query text that was validated (and run, on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub data: Vec<Row>,
    pub row_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SandboxFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    /// Raw model output kept when no query could be extracted from it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
}

impl SandboxExecution {
    pub fn failed(reason: FailureReason, error: impl Into<String>) -> Self {
        Self {
            success: false,
            sql: None,
            data: Vec::new(),
            row_count: 0,
            truncated: false,
            warning: None,
            failure: Some(SandboxFailure {
                reason,
                error: error.into(),
            }),
            validation: None,
            model_output: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_model_output(mut self, output: impl Into<String>) -> Self {
        self.model_output = Some(output.into());
        self
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.failure.as_ref().map(|f| f.reason)
    }

    pub fn error(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.error.as_str())
    }
}

/// Validation plus bounded read-only execution
pub struct QuerySandbox {
    db: Arc<ReadOnlyDatabase>,
    limits: SandboxLimits,
}

impl QuerySandbox {
    pub fn new(db: Arc<ReadOnlyDatabase>, limits: SandboxLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn validate(&self, sql: &str) -> ValidationOutcome {
        validate_query(sql, &self.limits)
    }

    /// Validate `sql` and run it if every layer passes.
    pub async fn execute(&self, sql: &str) -> SandboxExecution {
        let validation = self.validate(sql);

        if !validation.valid {
            let reason = validation.reason.unwrap_or(ValidationReason::EmptyQuery);
            let error = validation.error.clone().unwrap_or_default();
            warn!(
                "[SQL] Query rejected ({}): {} | \"{}\"",
                reason,
                error,
                truncate_text(sql, 60)
            );
            let mut execution =
                SandboxExecution::failed(FailureReason::Security(reason), error).with_sql(sql);
            execution.validation = Some(validation);
            return execution;
        }

        info!("[SQL] Executing validated query: \"{}\"", truncate_text(sql, 60));

        let db = Arc::clone(&self.db);
        let cap = self.limits.max_result_rows;
        let owned_sql = sql.to_string();
        let fetched = tokio::task::spawn_blocking(move || db.query_capped(&owned_sql, cap)).await;

        let (data, truncated) = match fetched {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("[SQL] Database error: {}", e);
                let mut execution = SandboxExecution::failed(
                    FailureReason::DatabaseError,
                    format!("Database error: {}", e),
                )
                .with_sql(sql);
                execution.validation = Some(validation);
                return execution;
            }
            Err(e) => {
                warn!("[SQL] Query task failed: {}", e);
                return SandboxExecution::failed(
                    FailureReason::UnexpectedError,
                    format!("Unexpected error: {}", e),
                )
                .with_sql(sql);
            }
        };

        let warning = truncated.then(|| format!("Results truncated to {} rows", cap));
        if let Some(ref w) = warning {
            warn!("[SQL] {}", w);
        }
        info!("[SQL] Query returned {} row(s)", data.len());

        SandboxExecution {
            success: true,
            sql: Some(sql.to_string()),
            row_count: data.len(),
            data,
            truncated,
            warning,
            failure: None,
            validation: Some(validation),
            model_output: None,
        }
    }
}
