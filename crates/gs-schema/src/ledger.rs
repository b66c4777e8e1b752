//! Persisted schema version.
//!
//! A single scalar in the generic name/value table `app_config`
//! (`name='db_version'`). History is reconstructed from the mutation
//! registry's numbering, not from a log of applied units.

use crate::error::{SchemaError, SchemaResult};
use gs_db::{Database, Param};
use std::sync::Arc;

/// Versions below the floor predate automatic updates; `current()` never
/// reports less than this.
pub const VERSION_FLOOR: u32 = 99;

const VERSION_NAME: &str = "db_version";

/// Reads and advances the persisted schema version.
///
/// Owned exclusively by the migration driver; nothing else writes the row.
pub struct VersionLedger {
    db: Arc<dyn Database>,
}

impl VersionLedger {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Current schema version, with [`VERSION_FLOOR`] as the default for a
    /// database that has never been versioned.
    pub async fn current(&self) -> SchemaResult<u32> {
        let value = self
            .db
            .query_string(
                "SELECT `value` FROM `app_config` WHERE `name` = ?",
                &[Param::from(VERSION_NAME)],
            )
            .await?;
        match value {
            None => Ok(VERSION_FLOOR),
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map(|v| v.max(VERSION_FLOOR))
                .map_err(|_| {
                    SchemaError::LedgerError(format!(
                        "stored {VERSION_NAME} value {raw:?} is not an integer"
                    ))
                }),
        }
    }

    /// Record `version` as applied. Called only after the corresponding
    /// mutation unit returned without error; the write is read back before
    /// the caller proceeds.
    pub async fn advance(&self, version: u32) -> SchemaResult<()> {
        let value = version.to_string();
        self.db
            .execute_with(
                "INSERT INTO `app_config` (`name`, `value`) VALUES (?, ?) \
                 ON DUPLICATE KEY UPDATE `value` = ?",
                &[
                    Param::from(VERSION_NAME),
                    Param::from(value.clone()),
                    Param::from(value),
                ],
            )
            .await?;

        let stored = self.current().await?;
        if stored != version {
            return Err(SchemaError::LedgerError(format!(
                "advance to {version} not confirmed: ledger reads {stored}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
