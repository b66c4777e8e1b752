//! Update command: apply all pending schema mutations.
//!
//! Normally invoked by the deployment pipeline rather than by hand, so that
//! everything happens in the right order relative to code rollout.

use anyhow::Result;
use chrono::Utc;
use gs_schema::{MigrationDriver, UpdateOutcome};
use std::time::Instant;

use super::common::{connect, load_config};
use crate::cli::GlobalArgs;

pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let db = connect(&config, global).await?;

    if global.verbose {
        eprintln!(
            "[verbose] updating schema of '{}' at {}",
            config.name,
            Utc::now().to_rfc3339()
        );
    }

    let started = Instant::now();
    let driver = MigrationDriver::new(db, config);
    let outcome = driver.run().await?;

    match outcome {
        UpdateOutcome::SkippedNoTriggers => {
            println!("Triggers / stored functions are not installed yet - skipped schema versioning.");
        }
        UpdateOutcome::Completed {
            previous_version,
            version,
            applied,
            charset,
            engines,
        } => {
            for mutation in &applied {
                println!("applied schema mutation #{} - {}", mutation.version, mutation.summary);
            }
            for table in &charset.converted {
                println!("migrated table `{table}` to the target charset");
            }
            for table in &engines.converted {
                println!("converted table `{table}` to the target storage engine");
            }
            for warning in &charset.warnings {
                eprintln!("Warning: {warning}");
            }

            let elapsed = started.elapsed().as_secs_f64();
            if applied.is_empty() {
                println!("Database is up to date at version {version} ({elapsed:.1}s).");
            } else {
                println!(
                    "Updated from version {previous_version} to {version}: {} mutations ({elapsed:.1}s).",
                    applied.len()
                );
            }
        }
    }
    Ok(())
}
