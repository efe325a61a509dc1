//! fluxion-sql: SQLite access and the query sandbox
//!
//! # Modules
//!
//! - `connection`: lazily opened read-write and read-only SQLite handles
//! - `validation`: ordered lexical checks for model-generated queries
//! - `sandbox`: validation plus row-capped execution on the read-only handle
//! - `format`: plain-text rendering of sandbox results

pub mod connection;
pub mod error;
pub mod format;
pub mod sandbox;
pub mod validation;

pub use connection::{Database, ReadOnlyDatabase, Row};
pub use error::{Result, SqlError};
pub use format::{display_value, format_sql_results};
pub use rusqlite::types::Value as SqlValue;
pub use sandbox::{FailureReason, QuerySandbox, SandboxExecution, SandboxFailure};
pub use validation::{
    check_complexity, check_keyword_blocklist, check_select_only, extract_table_names,
    validate_query, LayerResult, QueryMetadata, SandboxLimits, ValidationLayer,
    ValidationOutcome, ValidationReason, FORBIDDEN_SQL_KEYWORDS,
};
