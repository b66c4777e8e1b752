//! Database trait definition

use crate::error::DbResult;
use async_trait::async_trait;

/// A bound statement parameter.
///
/// Identifiers can never be bound; only values go through here. Identifier
/// names that must be interpolated into DDL go through
/// [`crate::ident::quote_ident`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Str(String),
    Int(i64),
    UInt(u64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::UInt(u64::from(value))
    }
}

/// Kind of stored routine in the information catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    /// Value of `information_schema.ROUTINES.ROUTINE_TYPE`.
    pub fn catalog_name(self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        }
    }
}

/// One result row; every column is fetched as text (cast in the query when
/// the column is not naturally textual).
pub type Row = Vec<Option<String>>;

/// A table name paired with its collation, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCollation {
    pub table: String,
    pub collation: String,
}

/// Database abstraction trait for the schema-update engine.
///
/// Implementations must be Send + Sync for async operation. One logical
/// connection is used serially for the whole run; implementations do not
/// need to support concurrent callers.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single DDL/DML statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<u64>;

    /// Execute a statement with bound value parameters
    async fn execute_with(&self, sql: &str, params: &[Param]) -> DbResult<u64>;

    /// Fetch a single textual scalar, `None` when no row matches
    async fn query_string(&self, sql: &str, params: &[Param]) -> DbResult<Option<String>>;

    /// Fetch a single integer scalar, `None` when no row matches
    async fn query_i64(&self, sql: &str, params: &[Param]) -> DbResult<Option<i64>>;

    /// Fetch all rows; every selected column must be textual (use CAST)
    async fn query_rows(&self, sql: &str, params: &[Param]) -> DbResult<Vec<Row>>;

    /// Check if a base table exists in the connected schema
    async fn table_exists(&self, table: &str) -> DbResult<bool>;

    /// Check if a column exists
    async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool>;

    /// Data type of a column (catalog spelling), `None` when absent
    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>>;

    /// Check if a named index exists on a table
    async fn index_exists(&self, table: &str, index: &str) -> DbResult<bool>;

    /// Check if a stored routine of the given kind exists
    async fn routine_exists(&self, name: &str, kind: RoutineKind) -> DbResult<bool>;

    /// Default character set of the connected schema
    async fn schema_charset(&self) -> DbResult<Option<String>>;

    /// Collation of every base table in the connected schema
    async fn table_collations(&self) -> DbResult<Vec<TableCollation>>;

    /// Names of base tables stored with the given engine
    async fn tables_with_engine(&self, engine: &str) -> DbResult<Vec<String>>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
