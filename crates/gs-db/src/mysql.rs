//! MySQL database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{Database, Param, RoutineKind, Row, TableCollation};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{MySql, Row as _};

/// MySQL database backend.
///
/// The pool is capped at a single connection; the whole schema update runs
/// serially over one session, so statements like `SET @...` keep their
/// effect for the rest of the run.
pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    /// Connect to the database named in `url`.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self { pool })
    }

    fn bind<'q>(
        sql: &'q str,
        params: &'q [Param],
    ) -> Query<'q, MySql, MySqlArguments> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Str(s) => query.bind(s),
                Param::Int(i) => query.bind(i),
                Param::UInt(u) => query.bind(u),
            };
        }
        query
    }
}

#[async_trait]
impl Database for MySqlBackend {
    async fn execute(&self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::ExecutionError(format!("{e}: {sql}")))?;
        Ok(result.rows_affected())
    }

    async fn execute_with(&self, sql: &str, params: &[Param]) -> DbResult<u64> {
        let result = Self::bind(sql, params)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::ExecutionError(format!("{e}: {sql}")))?;
        Ok(result.rows_affected())
    }

    async fn query_string(&self, sql: &str, params: &[Param]) -> DbResult<Option<String>> {
        let row = Self::bind(sql, params)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>(0).map_err(DbError::from)?),
            None => Ok(None),
        }
    }

    async fn query_i64(&self, sql: &str, params: &[Param]) -> DbResult<Option<i64>> {
        let row = Self::bind(sql, params)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        match row {
            Some(row) => Ok(row.try_get::<Option<i64>, _>(0).map_err(DbError::from)?),
            None => Ok(None),
        }
    }

    async fn query_rows(&self, sql: &str, params: &[Param]) -> DbResult<Vec<Row>> {
        let rows = Self::bind(sql, params)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).map_err(DbError::from))
                    .collect()
            })
            .collect()
    }

    async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let count = self
            .query_i64(
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 AND TABLE_TYPE = 'BASE TABLE'",
                &[Param::from(table)],
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool> {
        let count = self
            .query_i64(
                "SELECT COUNT(*) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
                &[Param::from(table), Param::from(column)],
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>> {
        self.query_string(
            "SELECT DATA_TYPE FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
            &[Param::from(table), Param::from(column)],
        )
        .await
    }

    async fn index_exists(&self, table: &str, index: &str) -> DbResult<bool> {
        let count = self
            .query_i64(
                "SELECT COUNT(*) FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME = ?",
                &[Param::from(table), Param::from(index)],
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn routine_exists(&self, name: &str, kind: RoutineKind) -> DbResult<bool> {
        let count = self
            .query_i64(
                "SELECT COUNT(*) FROM information_schema.ROUTINES \
                 WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_NAME = ? AND ROUTINE_TYPE = ?",
                &[Param::from(name), Param::from(kind.catalog_name())],
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn schema_charset(&self) -> DbResult<Option<String>> {
        self.query_string(
            "SELECT DEFAULT_CHARACTER_SET_NAME FROM information_schema.SCHEMATA \
             WHERE SCHEMA_NAME = DATABASE()",
            &[],
        )
        .await
    }

    async fn table_collations(&self) -> DbResult<Vec<TableCollation>> {
        let rows = self
            .query_rows(
                "SELECT TABLE_NAME, TABLE_COLLATION FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match (row.first().cloned(), row.get(1).cloned()) {
                (Some(Some(table)), Some(Some(collation))) => {
                    Some(TableCollation { table, collation })
                }
                _ => None,
            })
            .collect())
    }

    async fn tables_with_engine(&self, engine: &str) -> DbResult<Vec<String>> {
        let rows = self
            .query_rows(
                "SELECT TABLE_NAME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND ENGINE = ? \
                 AND TABLE_TYPE = 'BASE TABLE'",
                &[Param::from(engine)],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect())
    }

    fn db_type(&self) -> &'static str {
        "mysql"
    }
}
