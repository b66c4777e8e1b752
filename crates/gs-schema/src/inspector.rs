//! Read-only schema introspection facade.
//!
//! Every mutation unit checks its preconditions here before touching the
//! schema, which is what makes re-running a unit safe. Absence of a table,
//! column, index, or routine is a valid answer, never an error.

use crate::error::SchemaResult;
use gs_db::{validate_identifier, Database, RoutineKind};
use std::sync::Arc;

/// Query facade answering "does X exist, and with what type?".
///
/// Identifier arguments are validated against the allow-list before they
/// reach the backend; the backend binds them as values, so nothing here is
/// ever interpolated into SQL.
pub struct SchemaInspector {
    db: Arc<dyn Database>,
}

impl SchemaInspector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Check if a base table exists.
    pub async fn table_exists(&self, table: &str) -> SchemaResult<bool> {
        validate_identifier(table)?;
        Ok(self.db.table_exists(table).await?)
    }

    /// Check if a column exists.
    pub async fn column_exists(&self, table: &str, column: &str) -> SchemaResult<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        Ok(self.db.column_exists(table, column).await?)
    }

    /// Data type of a column, normalized to uppercase (`DATETIME`,
    /// `VARCHAR`, ...). `None` when the column does not exist.
    pub async fn column_type(&self, table: &str, column: &str) -> SchemaResult<Option<String>> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let data_type = self.db.column_type(table, column).await?;
        Ok(data_type.map(|t| t.to_ascii_uppercase()))
    }

    /// Check if a named index exists on a table.
    pub async fn index_exists(&self, table: &str, index: &str) -> SchemaResult<bool> {
        validate_identifier(table)?;
        validate_identifier(index)?;
        Ok(self.db.index_exists(table, index).await?)
    }

    /// Check if a stored procedure exists.
    pub async fn procedure_exists(&self, name: &str) -> SchemaResult<bool> {
        validate_identifier(name)?;
        Ok(self.db.routine_exists(name, RoutineKind::Procedure).await?)
    }

    /// Check if a stored function exists.
    pub async fn function_exists(&self, name: &str) -> SchemaResult<bool> {
        validate_identifier(name)?;
        Ok(self.db.routine_exists(name, RoutineKind::Function).await?)
    }
}

#[cfg(test)]
#[path = "inspector_test.rs"]
mod tests;
