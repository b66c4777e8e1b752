//! Global consistency passes run after the mutation loop.
//!
//! New tables appear over time; rather than trusting every mutation to get
//! charset and storage engine right, the whole schema is normalized once at
//! the end of each update run. Mismatches that cannot be migrated safely
//! are warnings, not errors; these passes are advisory improvements, not
//! structural prerequisites.

use crate::error::SchemaResult;
use gs_core::ConsistencyConfig;
use gs_db::{quote_ident, Database};
use serde::Serialize;

/// Engine older installations used for everything; tables still on it are
/// converted to the configured target.
const LEGACY_ENGINE: &str = "MyISAM";

/// Result of the charset normalization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CharsetReport {
    /// Database default charset was upgraded
    pub database_converted: bool,
    /// Tables converted to the target charset
    pub converted: Vec<String>,
    /// Mismatches that were left alone (downgrades would lose data)
    pub warnings: Vec<String>,
}

/// Result of the storage-engine normalization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineReport {
    /// Tables moved off the legacy engine
    pub converted: Vec<String>,
}

fn is_exempt(table: &str, config: &ConsistencyConfig, exact: &[String]) -> bool {
    config
        .exempt_prefixes
        .iter()
        .any(|prefix| table.starts_with(prefix.as_str()))
        || exact.iter().any(|name| name == table)
}

/// Align the database default charset and every table's charset with the
/// configured target. Only the upgrade path (`utf8` to `utf8mb4`) is
/// performed; anything else is reported as a warning because a downgrade
/// might lose data.
pub async fn normalize_charsets(
    db: &dyn Database,
    config: &ConsistencyConfig,
) -> SchemaResult<CharsetReport> {
    let mut report = CharsetReport::default();
    let target = config.charset.as_str();

    let current = db.schema_charset().await?;
    if current.as_deref() != Some(target) {
        if target == "utf8mb4" {
            db.execute(&format!(
                "ALTER DATABASE DEFAULT CHARACTER SET '{}' DEFAULT COLLATE '{}'",
                target, config.collation
            ))
            .await?;
            report.database_converted = true;
        } else {
            let warning = format!("cannot migrate database default charset to {target}");
            log::warn!("{warning}");
            report.warnings.push(warning);
        }
    }

    for entry in db.table_collations().await? {
        if is_exempt(&entry.table, config, &config.charset_exempt_tables) {
            continue;
        }
        let family = entry.collation.split('_').next().unwrap_or("");
        if family == target {
            continue;
        }
        if family == "utf8" && target == "utf8mb4" {
            // Keep the collation flavor, swap only the charset family:
            // utf8_unicode_ci becomes utf8mb4_unicode_ci.
            let collation = format!(
                "{target}{}",
                entry.collation.strip_prefix(family).unwrap_or("")
            );
            log::info!(
                "migrating table `{}` from charset {family} to {target}",
                entry.table
            );
            db.execute(&format!(
                "ALTER TABLE {} CONVERT TO CHARACTER SET '{target}' COLLATE '{collation}'",
                quote_ident(&entry.table)?
            ))
            .await?;
            report.converted.push(entry.table);
        } else {
            let warning = format!(
                "cannot migrate table `{}` from charset {family} to {target}",
                entry.table
            );
            log::warn!("{warning}");
            report.warnings.push(warning);
        }
    }

    Ok(report)
}

/// Move every non-exempt table still on the legacy storage engine to the
/// configured target engine.
pub async fn normalize_storage_engines(
    db: &dyn Database,
    config: &ConsistencyConfig,
) -> SchemaResult<EngineReport> {
    let mut report = EngineReport::default();

    for table in db.tables_with_engine(LEGACY_ENGINE).await? {
        if is_exempt(&table, config, &config.engine_exempt_tables) {
            continue;
        }
        log::info!(
            "converting table `{table}` from {LEGACY_ENGINE} to {}",
            config.storage_engine
        );
        db.execute(&format!(
            "ALTER TABLE {} ENGINE={}",
            quote_ident(&table)?,
            config.storage_engine
        ))
        .await?;
        report.converted.push(table);
    }

    Ok(report)
}

#[cfg(test)]
#[path = "consistency_test.rs"]
mod tests;
