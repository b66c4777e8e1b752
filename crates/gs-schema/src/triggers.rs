//! Stored-procedure and trigger synchronization.
//!
//! Procedures and triggers are regenerated by an external installer that is
//! versioned independently of this crate. The database reports the last
//! schema version its trigger set was generated for through the stored
//! function `schema_trigger_version()`; the synchronizer only ever moves
//! that watermark forward.

use crate::error::{SchemaError, SchemaResult};
use gs_core::Config;
use gs_db::{Database, RoutineKind};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Stored function reporting the installed trigger-set version.
pub const TRIGGER_VERSION_FUNCTION: &str = "schema_trigger_version";

/// Invokes the external procedure/trigger installer when the installed
/// trigger set lags behind the schema version being applied.
pub struct TriggerSync {
    db: Arc<dyn Database>,
    installer: PathBuf,
    timeout: Duration,
    sentinel: PathBuf,
}

impl TriggerSync {
    pub fn new(db: Arc<dyn Database>, config: &Config) -> Self {
        Self {
            db,
            installer: config.triggers.installer.clone(),
            timeout: Duration::from_secs(config.triggers.timeout_secs),
            sentinel: config.sync_sentinel_path(),
        }
    }

    /// Version the installed trigger set was generated for; 0 when the
    /// reporting function does not exist yet.
    pub async fn installed_version(&self) -> SchemaResult<u32> {
        if !self
            .db
            .routine_exists(TRIGGER_VERSION_FUNCTION, RoutineKind::Function)
            .await?
        {
            return Ok(0);
        }
        let version = self
            .db
            .query_i64("SELECT schema_trigger_version()", &[])
            .await?
            .unwrap_or(0);
        Ok(u32::try_from(version).unwrap_or(0))
    }

    /// Regenerate procedures and triggers for `target` unless the installed
    /// set is already at that version or newer.
    ///
    /// The installer is trusted to be idempotent forward but not safe
    /// backward; re-running an old mutation must never downgrade the
    /// trigger set, which the version comparison here guarantees.
    pub async fn ensure_current(&self, target: u32) -> SchemaResult<()> {
        let installed = self.installed_version().await?;
        if installed >= target {
            log::debug!("trigger set at version {installed}, target {target} - nothing to do");
            return Ok(());
        }

        self.write_sentinel().await?;
        log::info!(
            "regenerating triggers for schema version {target} via {}",
            self.installer.display()
        );

        let mut command = Command::new(&self.installer);
        command
            .arg("--schema-version")
            .arg(target.to_string())
            .arg("--flush")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let status = match tokio::time::timeout(self.timeout, command.status()).await {
            Err(_) => {
                return Err(SchemaError::TriggerSyncFailed(format!(
                    "installer {} did not finish within {}s",
                    self.installer.display(),
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(e)) => {
                return Err(SchemaError::TriggerSyncFailed(format!(
                    "failed to run installer {}: {e}",
                    self.installer.display()
                )));
            }
            Ok(Ok(status)) => status,
        };

        if !status.success() {
            return Err(SchemaError::TriggerSyncFailed(format!(
                "installer {} exited with {status}",
                self.installer.display()
            )));
        }

        // The installer deletes the sentinel as its final step; a surviving
        // sentinel means it stopped somewhere in between. No cleanup here -
        // the operator has to inspect the half-regenerated trigger set.
        match tokio::fs::try_exists(&self.sentinel).await {
            Ok(false) => Ok(()),
            _ => Err(SchemaError::TriggerSyncIncomplete {
                sentinel: self.sentinel.clone(),
            }),
        }
    }

    async fn write_sentinel(&self) -> SchemaResult<()> {
        if let Some(parent) = self.sentinel.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SchemaError::TriggerSyncFailed(format!(
                    "cannot create runtime directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        tokio::fs::write(&self.sentinel, b"trigger sync in progress\n")
            .await
            .map_err(|e| {
                SchemaError::TriggerSyncFailed(format!(
                    "cannot create sentinel {}: {e}",
                    self.sentinel.display()
                ))
            })
    }
}

#[cfg(test)]
#[path = "triggers_test.rs"]
mod tests;
