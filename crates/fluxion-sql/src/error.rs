//! Error types for database access

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("Database file not found: {0}")]
    NotFound(PathBuf),

    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection lock poisoned")]
    LockPoisoned,

    #[error("Query task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, SqlError>;

impl From<tokio::task::JoinError> for SqlError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlError::Task(err.to_string())
    }
}

impl From<SqlError> for fluxion_core::Error {
    fn from(err: SqlError) -> Self {
        fluxion_core::Error::database(err.to_string())
    }
}
