//! Migration driver.
//!
//! Orchestrates one update run: verify the baseline, then read the current
//! version, apply the next registered mutation, confirm the ledger, and
//! repeat until no next unit exists. The charset and storage-engine passes
//! run exactly once afterwards, whether or not any mutation was applied.

use crate::consistency::{self, CharsetReport, EngineReport};
use crate::error::{SchemaError, SchemaResult};
use crate::inspector::SchemaInspector;
use crate::ledger::VersionLedger;
use crate::registry::{MutationContext, MutationRegistry};
use crate::triggers::TriggerSync;
use gs_core::Config;
use gs_db::Database;
use std::sync::Arc;

/// Column whose presence marks a schema new enough for automatic updates.
///
/// Databases predating it must be brought forward manually; the recorded
/// mutations assume everything up to this point is in place.
const BASELINE_TABLE: &str = "cache_attributes";
const BASELINE_COLUMN: &str = "gc_id";

/// Procedure probed to tell a fresh install (no trigger layer at all) from
/// an upgradable one. A fresh install gets its schema and triggers from the
/// full-install path, not from incremental mutations.
const TRIGGER_BASELINE_PROCEDURE: &str = "sp_touch_listing";

/// One mutation applied during a run.
#[derive(Debug, Clone)]
pub struct AppliedMutation {
    pub version: u32,
    pub summary: &'static str,
}

/// Result of a completed update run.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The trigger layer is not installed at all; versioning was skipped
    /// without probing the schema.
    SkippedNoTriggers,

    /// The mutation loop ran to completion.
    Completed {
        previous_version: u32,
        version: u32,
        applied: Vec<AppliedMutation>,
        charset: CharsetReport,
        engines: EngineReport,
    },
}

/// Drives the update state machine over a single serial connection.
pub struct MigrationDriver {
    db: Arc<dyn Database>,
    inspector: SchemaInspector,
    ledger: VersionLedger,
    triggers: TriggerSync,
    registry: MutationRegistry,
    config: Config,
}

impl MigrationDriver {
    /// Driver over the standard registry of recorded mutations.
    pub fn new(db: Arc<dyn Database>, config: Config) -> Self {
        Self::with_registry(db, config, MutationRegistry::standard())
    }

    /// Driver over an explicit registry.
    pub fn with_registry(
        db: Arc<dyn Database>,
        config: Config,
        registry: MutationRegistry,
    ) -> Self {
        Self {
            inspector: SchemaInspector::new(Arc::clone(&db)),
            ledger: VersionLedger::new(Arc::clone(&db)),
            triggers: TriggerSync::new(Arc::clone(&db), &config),
            db,
            registry,
            config,
        }
    }

    /// Run the update to completion.
    ///
    /// Any failure halts the whole run; mutations may depend on their
    /// predecessors, so there is no continue-on-error. The ledger is only
    /// advanced after a unit succeeds, which makes a re-run after a fix
    /// resume at the failed unit.
    pub async fn run(&self) -> SchemaResult<UpdateOutcome> {
        if !self
            .inspector
            .column_exists(BASELINE_TABLE, BASELINE_COLUMN)
            .await?
        {
            return Err(SchemaError::BootstrapTooOld);
        }

        if !self
            .inspector
            .procedure_exists(TRIGGER_BASELINE_PROCEDURE)
            .await?
        {
            log::info!(
                "triggers / stored functions are not installed yet - skipping schema versioning"
            );
            return Ok(UpdateOutcome::SkippedNoTriggers);
        }

        let previous_version = self.ledger.current().await?;
        let mut version = previous_version;
        let mut applied = Vec::new();

        loop {
            let next = version + 1;
            let Some(unit) = self.registry.get(next) else {
                break;
            };

            log::info!("applying schema mutation #{next}: {}", unit.summary);
            let ctx = MutationContext {
                db: self.db.as_ref(),
                inspector: &self.inspector,
                triggers: &self.triggers,
                config: &self.config,
                version: next,
            };
            unit.apply(&ctx)
                .await
                .map_err(|e| SchemaError::MutationFailed {
                    version: next,
                    message: e.to_string(),
                })?;

            self.ledger.advance(next).await?;
            applied.push(AppliedMutation {
                version: next,
                summary: unit.summary,
            });
            version = next;
        }

        let charset = consistency::normalize_charsets(self.db.as_ref(), &self.config.consistency)
            .await?;
        let engines =
            consistency::normalize_storage_engines(self.db.as_ref(), &self.config.consistency)
                .await?;

        Ok(UpdateOutcome::Completed {
            previous_version,
            version,
            applied,
            charset,
            engines,
        })
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod tests;
