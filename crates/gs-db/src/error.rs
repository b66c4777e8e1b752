//! Error types for gs-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Query / decode error (D003)
    #[error("[D003] SQL query failed: {0}")]
    QueryError(String),

    /// Invalid identifier (D004)
    #[error("[D004] Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::QueryError(err.to_string())
            }
            _ => DbError::ExecutionError(err.to_string()),
        }
    }
}
