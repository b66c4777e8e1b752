//! Error types for the schema versioning engine.

use gs_db::DbError;
use std::path::PathBuf;
use thiserror::Error;

/// Schema update errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Baseline marker is missing; automatic updates cannot run (S001).
    #[error(
        "[S001] Database structure too old: `cache_attributes`.`gc_id` is missing. \
         Perform the manual historical upgrade (see sql/db-changes.txt) before \
         running automatic updates."
    )]
    BootstrapTooOld,

    /// A mutation unit raised an error; the run halts and the ledger is not
    /// advanced (S002).
    #[error("[S002] Schema mutation #{version} failed: {message}")]
    MutationFailed { version: u32, message: String },

    /// The persisted version could not be read or confirmed (S003).
    #[error("[S003] Version ledger error: {0}")]
    LedgerError(String),

    /// The external installer could not be run to completion (S004).
    #[error("[S004] Trigger installer failed: {0}")]
    TriggerSyncFailed(String),

    /// The installer returned but left the sync sentinel behind (S005).
    #[error(
        "[S005] Trigger installer did not complete: sentinel {} still exists; \
         operator intervention required",
        sentinel.display()
    )]
    TriggerSyncIncomplete { sentinel: PathBuf },

    /// A one-time backfill met a record it cannot interpret (S006).
    #[error("[S006] Unrecognized data in `{table}` during backfill, record {record}: {message}")]
    BackfillDataMismatch {
        table: String,
        record: String,
        message: String,
    },

    /// A static reference-data file is missing or malformed (S007).
    #[error("[S007] Static data file error: {0}")]
    StaticDataError(String),

    /// Database driver error with preserved source chain (S008).
    #[error("[S008] Database error")]
    Db(#[source] DbError),
}

/// Result type alias for [`SchemaError`].
pub type SchemaResult<T> = Result<T, SchemaError>;

impl From<DbError> for SchemaError {
    fn from(err: DbError) -> Self {
        SchemaError::Db(err)
    }
}
