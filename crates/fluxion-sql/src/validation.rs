//! Lexical validation of model-generated SQL
//!
//! Layers run in a fixed order and stop at the first failure:
//!
//! 1. emptiness
//! 2. keyword blocklist (string literals removed first)
//! 3. statement shape (`SELECT` or `WITH` after comments are removed)
//! 4. complexity (length ceiling, then `SELECT` count ceiling)
//!
//! These are regex checks, not a parser. Keywords assembled from concatenated
//! literals or other obfuscations are not detected here; the read-only
//! connection is what actually prevents writes.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use fluxion_core::AppConfig;

/// Statement verbs that never appear in an accepted query
pub const FORBIDDEN_SQL_KEYWORDS: &[&str] = &[
    // data modification
    "DELETE", "INSERT", "UPDATE", "REPLACE", "MERGE",
    // schema modification
    "DROP", "CREATE", "ALTER", "TRUNCATE", "RENAME",
    // transaction control
    "COMMIT", "ROLLBACK", "SAVEPOINT", "BEGIN", "TRANSACTION",
    // execution
    "EXEC", "EXECUTE", "PRAGMA",
    // database control
    "ATTACH", "DETACH",
    // maintenance
    "VACUUM", "REINDEX", "ANALYZE",
];

lazy_static! {
    static ref SINGLE_QUOTED: Regex = Regex::new(r"'[^']*'").expect("valid regex");
    static ref DOUBLE_QUOTED: Regex = Regex::new(r#""[^"]*""#).expect("valid regex");
    static ref KEYWORD_PATTERNS: Vec<(&'static str, Regex)> = FORBIDDEN_SQL_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"\b{}\b", regex::escape(kw))).expect("valid regex")))
        .collect();
    static ref LINE_COMMENT: Regex = Regex::new(r"--[^\n]*").expect("valid regex");
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").expect("valid regex");
    static ref SELECT_SHAPE: Regex = Regex::new(r"(?i)^\s*(SELECT|WITH)\s+").expect("valid regex");
    static ref SELECT_WORD: Regex = Regex::new(r"(?i)\bSELECT\b").expect("valid regex");
    static ref TABLE_REF: Regex =
        Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid regex");
}

// ============================================================================
// LIMITS
// ============================================================================

/// Ceilings applied by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub max_result_rows: usize,
    pub max_query_length: usize,
    pub max_select_count: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_result_rows: 1000,
            max_query_length: 2000,
            max_select_count: 5,
        }
    }
}

impl SandboxLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_result_rows: config.max_result_rows,
            max_query_length: config.max_query_length,
            max_select_count: config.max_select_count,
        }
    }
}

// ============================================================================
// OUTCOME TYPES
// ============================================================================

/// Why a query was rejected before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    EmptyQuery,
    KeywordBlocklist,
    NotSelectStatement,
    QueryTooLong,
    TooManySubqueries,
}

impl ValidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationReason::EmptyQuery => "empty_query",
            ValidationReason::KeywordBlocklist => "keyword_blocklist",
            ValidationReason::NotSelectStatement => "not_select_statement",
            ValidationReason::QueryTooLong => "query_too_long",
            ValidationReason::TooManySubqueries => "too_many_subqueries",
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLayer {
    KeywordBlocklist,
    SelectOnly,
    Complexity,
}

impl ValidationLayer {
    /// Execution order of the layers after the emptiness check
    pub const ORDER: [ValidationLayer; 3] = [
        ValidationLayer::KeywordBlocklist,
        ValidationLayer::SelectOnly,
        ValidationLayer::Complexity,
    ];
}

/// Result of a single layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerResult {
    pub layer: ValidationLayer,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ValidationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set by the blocklist layer when it rejects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_keyword: Option<String>,
}

impl LayerResult {
    fn pass(layer: ValidationLayer) -> Self {
        Self {
            layer,
            valid: true,
            reason: None,
            error: None,
            blocked_keyword: None,
        }
    }

    fn fail(layer: ValidationLayer, reason: ValidationReason, error: String) -> Self {
        Self {
            layer,
            valid: false,
            reason: Some(reason),
            error: Some(error),
            blocked_keyword: None,
        }
    }
}

/// Advisory facts about an accepted query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub tables: Vec<String>,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ValidationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Layers that ran, in order; the last one is the failing one on rejection
    pub layers: Vec<LayerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueryMetadata>,
}

impl ValidationOutcome {
    fn rejected(layers: Vec<LayerResult>) -> Self {
        let failed = layers.last().cloned();
        Self {
            valid: false,
            reason: failed.as_ref().and_then(|l| l.reason),
            error: failed.as_ref().and_then(|l| l.error.clone()),
            blocked_keyword: failed.and_then(|l| l.blocked_keyword),
            layers,
            metadata: None,
        }
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Blocklist layer: first forbidden verb found outside string literals.
pub fn check_keyword_blocklist(sql: &str) -> LayerResult {
    let upper = sql.to_uppercase();
    let without_single = SINGLE_QUOTED.replace_all(&upper, "");
    let stripped = DOUBLE_QUOTED.replace_all(&without_single, "");

    for (keyword, pattern) in KEYWORD_PATTERNS.iter() {
        if pattern.is_match(&stripped) {
            let mut result = LayerResult::fail(
                ValidationLayer::KeywordBlocklist,
                ValidationReason::KeywordBlocklist,
                format!("Query contains forbidden SQL keyword: {}", keyword),
            );
            result.blocked_keyword = Some(keyword.to_string());
            return result;
        }
    }
    LayerResult::pass(ValidationLayer::KeywordBlocklist)
}

/// Shape layer: after removing comments the text must open with SELECT or WITH.
pub fn check_select_only(sql: &str) -> LayerResult {
    let without_lines = LINE_COMMENT.replace_all(sql, "");
    let cleaned = BLOCK_COMMENT.replace_all(&without_lines, "");

    if SELECT_SHAPE.is_match(cleaned.trim()) {
        LayerResult::pass(ValidationLayer::SelectOnly)
    } else {
        LayerResult::fail(
            ValidationLayer::SelectOnly,
            ValidationReason::NotSelectStatement,
            "Query must be a SELECT statement (or CTE starting with WITH)".to_string(),
        )
    }
}

/// Complexity layer: length ceiling, then SELECT occurrences as a subquery proxy.
pub fn check_complexity(sql: &str, limits: &SandboxLimits) -> LayerResult {
    if sql.chars().count() > limits.max_query_length {
        return LayerResult::fail(
            ValidationLayer::Complexity,
            ValidationReason::QueryTooLong,
            format!(
                "Query exceeds maximum length of {} characters",
                limits.max_query_length
            ),
        );
    }

    let selects = SELECT_WORD.find_iter(sql).count();
    if selects > limits.max_select_count {
        return LayerResult::fail(
            ValidationLayer::Complexity,
            ValidationReason::TooManySubqueries,
            format!("Query is too complex (contains {} SELECT statements)", selects),
        );
    }

    LayerResult::pass(ValidationLayer::Complexity)
}

/// Best-effort table names following FROM/JOIN, deduplicated and sorted.
pub fn extract_table_names(sql: &str) -> Vec<String> {
    TABLE_REF
        .captures_iter(sql)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Run every layer in order, stopping at the first rejection.
pub fn validate_query(sql: &str, limits: &SandboxLimits) -> ValidationOutcome {
    if sql.trim().is_empty() {
        return ValidationOutcome {
            valid: false,
            reason: Some(ValidationReason::EmptyQuery),
            error: Some("SQL query is empty".to_string()),
            layers: Vec::new(),
            blocked_keyword: None,
            metadata: None,
        };
    }

    let mut layers = Vec::with_capacity(ValidationLayer::ORDER.len());
    for layer in ValidationLayer::ORDER {
        let result = match layer {
            ValidationLayer::KeywordBlocklist => check_keyword_blocklist(sql),
            ValidationLayer::SelectOnly => check_select_only(sql),
            ValidationLayer::Complexity => check_complexity(sql, limits),
        };
        let valid = result.valid;
        layers.push(result);
        if !valid {
            return ValidationOutcome::rejected(layers);
        }
    }

    ValidationOutcome {
        valid: true,
        reason: None,
        error: None,
        layers,
        blocked_keyword: None,
        metadata: Some(QueryMetadata {
            tables: extract_table_names(sql),
            length: sql.chars().count(),
        }),
    }
}
