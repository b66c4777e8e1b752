//! Status command: current schema version and pending mutations.

use anyhow::Result;
use gs_schema::{MutationRegistry, VersionLedger};
use serde::Serialize;

use super::common::{connect, load_config, print_table};
use crate::cli::{GlobalArgs, StatusArgs, StatusOutput};

#[derive(Debug, Serialize)]
struct StatusReport {
    site: String,
    current_version: u32,
    highest_registered: Option<u32>,
    pending: Vec<PendingMutation>,
}

#[derive(Debug, Serialize)]
struct PendingMutation {
    version: u32,
    summary: String,
}

pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let db = connect(&config, global).await?;

    let ledger = VersionLedger::new(db);
    let registry = MutationRegistry::standard();

    let current_version = ledger.current().await?;
    let report = StatusReport {
        site: config.name.clone(),
        current_version,
        highest_registered: registry.highest(),
        pending: registry
            .pending_after(current_version)
            .iter()
            .map(|unit| PendingMutation {
                version: unit.version,
                summary: unit.summary.to_string(),
            })
            .collect(),
    };

    match args.output {
        StatusOutput::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        StatusOutput::Table => {
            println!("site:            {}", report.site);
            println!("current version: {}", report.current_version);
            if let Some(highest) = report.highest_registered {
                println!("highest known:   {highest}");
            }
            if report.pending.is_empty() {
                println!("\nDatabase is up to date.");
            } else {
                println!("\n{} pending mutations:\n", report.pending.len());
                let rows: Vec<Vec<String>> = report
                    .pending
                    .iter()
                    .map(|m| vec![format!("#{}", m.version), m.summary.clone()])
                    .collect();
                print_table(&["VERSION", "SUMMARY"], &rows);
            }
        }
    }
    Ok(())
}
