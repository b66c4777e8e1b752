//! Check command: run the consistency passes without applying mutations.
//!
//! Useful after restoring a dump or importing tables from another node,
//! when the structure version is current but charsets or storage engines
//! may have drifted.

use anyhow::Result;
use gs_schema::consistency::{normalize_charsets, normalize_storage_engines};

use super::common::{connect, load_config};
use crate::cli::GlobalArgs;

pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let db = connect(&config, global).await?;

    let charset = normalize_charsets(db.as_ref(), &config.consistency).await?;
    let engines = normalize_storage_engines(db.as_ref(), &config.consistency).await?;

    if charset.database_converted {
        println!(
            "migrated database default charset to {}",
            config.consistency.charset
        );
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

    let changes =
        charset.converted.len() + engines.converted.len() + usize::from(charset.database_converted);
    if changes == 0 {
        println!("Schema is consistent; nothing to do.");
    } else {
        println!("{changes} inconsistencies fixed, {} warnings.", charset.warnings.len());
    }
    Ok(())
}
