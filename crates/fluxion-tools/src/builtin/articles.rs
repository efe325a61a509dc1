//! Article data-access operations
//!
//! Read-only queries over the `ArticleApproveds` table, all with bound
//! parameters. `is_approved` defaults to `true`; an explicit `null` drops the
//! approval filter.

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use fluxion_sql::{Database, Row, SqlValue};

use crate::args::{opt_bool, opt_i64, opt_str, req_i64, req_str};
use crate::registry::OperationCatalog;
use crate::tool::{OperationDefinition, ParamType, Parameter};

pub const CATEGORY: &str = "articles";

const ARTICLE_COLUMNS: &str = "id, userId, articleId, isApproved, headlineForPdfReport, \
     publicationNameForPdfReport, publicationDateForPdfReport, textForPdfReport, \
     urlForPdfReport, kmNotes, createdAt, updatedAt";

const SEARCH_FIELDS: &[&str] = &[
    "headlineForPdfReport",
    "kmNotes",
    "textForPdfReport",
    "publicationNameForPdfReport",
];

pub const DATE_FIELDS: &[&str] = &["createdAt", "updatedAt", "publicationDateForPdfReport"];

/// Query functions over `ArticleApproveds`
#[derive(Clone)]
pub struct ArticleQueries {
    db: Arc<Database>,
}

impl ArticleQueries {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn count(&self, is_approved: Option<bool>) -> Result<i64> {
        let (clause, params) = approval_clause(is_approved);
        let sql = format!(
            "SELECT COUNT(*) AS count FROM ArticleApproveds WHERE {}",
            clause.unwrap_or_else(|| "1=1".to_string())
        );
        let row = self.db.query_one(&sql, &params)?;
        Ok(row
            .and_then(|r| r.get("count").and_then(Value::as_i64))
            .unwrap_or(0))
    }

    pub fn search(&self, text: &str, is_approved: Option<bool>, limit: i64) -> Result<Vec<Row>> {
        let like = format!("%{}%", text);
        let mut conditions = vec![format!(
            "({})",
            SEARCH_FIELDS
                .iter()
                .map(|f| format!("{} LIKE ?", f))
                .collect::<Vec<_>>()
                .join(" OR ")
        )];
        let mut params: Vec<SqlValue> = SEARCH_FIELDS
            .iter()
            .map(|_| SqlValue::Text(like.clone()))
            .collect();
        push_approval(&mut conditions, &mut params, is_approved);
        params.push(SqlValue::Integer(limit));

        let sql = format!(
            "SELECT {} FROM ArticleApproveds WHERE {} ORDER BY createdAt DESC LIMIT ?",
            ARTICLE_COLUMNS,
            conditions.join(" AND ")
        );
        Ok(self.db.query_rows(&sql, &params)?)
    }

    pub fn by_user(&self, user_id: i64, is_approved: Option<bool>, limit: i64) -> Result<Vec<Row>> {
        let mut conditions = vec!["userId = ?".to_string()];
        let mut params = vec![SqlValue::Integer(user_id)];
        push_approval(&mut conditions, &mut params, is_approved);
        params.push(SqlValue::Integer(limit));

        let sql = format!(
            "SELECT {} FROM ArticleApproveds WHERE {} ORDER BY createdAt DESC LIMIT ?",
            ARTICLE_COLUMNS,
            conditions.join(" AND ")
        );
        Ok(self.db.query_rows(&sql, &params)?)
    }

    pub fn by_date_range(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
        date_field: &str,
        is_approved: Option<bool>,
        limit: i64,
    ) -> Result<Vec<Row>> {
        // Column names cannot be bound, so only known ones are spliced in.
        if !DATE_FIELDS.contains(&date_field) {
            bail!("date_field must be one of {:?}", DATE_FIELDS);
        }

        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some(start) = start_date.filter(|s| !s.is_empty()) {
            conditions.push(format!("{} >= ?", date_field));
            params.push(SqlValue::Text(start.to_string()));
        }
        if let Some(end) = end_date.filter(|s| !s.is_empty()) {
            conditions.push(format!("{} <= ?", date_field));
            params.push(SqlValue::Text(end.to_string()));
        }
        push_approval(&mut conditions, &mut params, is_approved);
        params.push(SqlValue::Integer(limit));

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };
        let sql = format!(
            "SELECT {} FROM ArticleApproveds WHERE {} ORDER BY {} DESC LIMIT ?",
            ARTICLE_COLUMNS, where_clause, date_field
        );
        Ok(self.db.query_rows(&sql, &params)?)
    }

    pub fn by_id(&self, article_approved_id: i64) -> Result<Option<Row>> {
        let sql = format!("SELECT {} FROM ArticleApproveds WHERE id = ?", ARTICLE_COLUMNS);
        Ok(self
            .db
            .query_one(&sql, &[SqlValue::Integer(article_approved_id)])?)
    }

    pub fn list(&self, is_approved: Option<bool>, limit: i64, offset: i64) -> Result<Vec<Row>> {
        let (clause, mut params) = approval_clause(is_approved);
        params.push(SqlValue::Integer(limit));
        params.push(SqlValue::Integer(offset));

        let sql = format!(
            "SELECT {} FROM ArticleApproveds WHERE {} ORDER BY createdAt DESC LIMIT ? OFFSET ?",
            ARTICLE_COLUMNS,
            clause.unwrap_or_else(|| "1=1".to_string())
        );
        Ok(self.db.query_rows(&sql, &params)?)
    }
}

fn approval_clause(is_approved: Option<bool>) -> (Option<String>, Vec<SqlValue>) {
    match is_approved {
        Some(flag) => (
            Some("isApproved = ?".to_string()),
            vec![SqlValue::Integer(i64::from(flag))],
        ),
        None => (None, Vec::new()),
    }
}

fn push_approval(conditions: &mut Vec<String>, params: &mut Vec<SqlValue>, is_approved: Option<bool>) {
    if let (Some(clause), values) = approval_clause(is_approved) {
        conditions.push(clause);
        params.extend(values);
    }
}

fn rows_to_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

// ============================================================================
// REGISTRATION
// ============================================================================

fn approval_param(description: &str) -> Parameter {
    Parameter::optional("is_approved", ParamType::Boolean, description).with_default(json!(true))
}

fn limit_param() -> Parameter {
    Parameter::optional("limit", ParamType::Integer, "Maximum number of results to return")
        .with_default(json!(10))
}

const APPROVAL_FILTER: &str = "Filter by approval status (true=approved, false=rejected, null=all)";

/// Register the six article operations on `catalog`.
pub async fn register_article_tools(catalog: &OperationCatalog, db: Arc<Database>) {
    let queries = ArticleQueries::new(db);

    let q = queries.clone();
    catalog
        .register_fn(
            OperationDefinition::new(
                "count_approved_articles",
                "Get the count of approved or not-approved articles in the ArticleApproveds table. \
                 Use this when the user asks how many articles have been approved or rejected.",
                CATEGORY,
            )
            .param(approval_param(
                "True to count approved articles, False to count rejected articles",
            )),
            move |args| Ok(json!(q.count(opt_bool(&args, "is_approved")?)?)),
        )
        .await;

    let q = queries.clone();
    catalog
        .register_fn(
            OperationDefinition::new(
                "search_approved_articles",
                "Search for articles by text content across headlines, publication names, \
                 article text, and knowledge manager notes. Use this when the user wants to \
                 find articles about a specific topic or keyword.",
                CATEGORY,
            )
            .param(Parameter::required(
                "search_text",
                ParamType::String,
                "Text to search for in articles",
            ))
            .param(approval_param(APPROVAL_FILTER))
            .param(limit_param()),
            move |args| {
                let rows = q.search(
                    &req_str(&args, "search_text")?,
                    opt_bool(&args, "is_approved")?,
                    opt_i64(&args, "limit")?.unwrap_or(10),
                )?;
                Ok(rows_to_value(rows))
            },
        )
        .await;

    let q = queries.clone();
    catalog
        .register_fn(
            OperationDefinition::new(
                "get_articles_by_user",
                "Get articles approved or reviewed by a specific user. \
                 Use this when the user asks about articles associated with a particular user ID.",
                CATEGORY,
            )
            .param(Parameter::required(
                "user_id",
                ParamType::Integer,
                "ID of the user who approved the articles",
            ))
            .param(approval_param(APPROVAL_FILTER))
            .param(limit_param()),
            move |args| {
                let rows = q.by_user(
                    req_i64(&args, "user_id")?,
                    opt_bool(&args, "is_approved")?,
                    opt_i64(&args, "limit")?.unwrap_or(10),
                )?;
                Ok(rows_to_value(rows))
            },
        )
        .await;

    let q = queries.clone();
    catalog
        .register_fn(
            OperationDefinition::new(
                "get_articles_by_date_range",
                "Get articles within a specific date range. \
                 Use this when the user asks about articles from a particular time period.",
                CATEGORY,
            )
            .param(Parameter::optional(
                "start_date",
                ParamType::String,
                "Start date in 'YYYY-MM-DD' format (e.g., '2024-01-01')",
            ))
            .param(Parameter::optional(
                "end_date",
                ParamType::String,
                "End date in 'YYYY-MM-DD' format (e.g., '2024-12-31')",
            ))
            .param(
                Parameter::optional(
                    "date_field",
                    ParamType::String,
                    "Date column to filter on: createdAt, updatedAt or publicationDateForPdfReport",
                )
                .with_default(json!("createdAt")),
            )
            .param(approval_param(APPROVAL_FILTER))
            .param(limit_param()),
            move |args| {
                let date_field =
                    opt_str(&args, "date_field")?.unwrap_or_else(|| "createdAt".to_string());
                let rows = q.by_date_range(
                    opt_str(&args, "start_date")?.as_deref(),
                    opt_str(&args, "end_date")?.as_deref(),
                    &date_field,
                    opt_bool(&args, "is_approved")?,
                    opt_i64(&args, "limit")?.unwrap_or(10),
                )?;
                Ok(rows_to_value(rows))
            },
        )
        .await;

    let q = queries.clone();
    catalog
        .register_fn(
            OperationDefinition::new(
                "get_article_by_id",
                "Get a specific article by its ArticleApproved ID. \
                 Use this when the user asks about a specific article by ID number.",
                CATEGORY,
            )
            .param(Parameter::required(
                "article_approved_id",
                ParamType::Integer,
                "ID of the ArticleApproved record",
            )),
            move |args| {
                let id = req_i64(&args, "article_approved_id")?;
                q.by_id(id)?
                    .map(Value::Object)
                    .ok_or_else(|| anyhow!("No article found with ID {}", id))
            },
        )
        .await;

    let q = queries;
    catalog
        .register_fn(
            OperationDefinition::new(
                "list_approved_articles",
                "Get a list of approved articles with pagination. \
                 Use this when the user wants to see a list of articles or browse through them.",
                CATEGORY,
            )
            .param(approval_param(APPROVAL_FILTER))
            .param(limit_param())
            .param(
                Parameter::optional(
                    "offset",
                    ParamType::Integer,
                    "Number of records to skip for pagination",
                )
                .with_default(json!(0)),
            ),
            move |args| {
                let rows = q.list(
                    opt_bool(&args, "is_approved")?,
                    opt_i64(&args, "limit")?.unwrap_or(10),
                    opt_i64(&args, "offset")?.unwrap_or(0),
                )?;
                Ok(rows_to_value(rows))
            },
        )
        .await;

    info!("Registered article tools");
}
