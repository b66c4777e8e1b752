//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use gs_core::Config;
use gs_db::{Database, MySqlBackend};
use std::path::Path;
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Load the configuration file named in the global CLI arguments.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    Config::load(Path::new(&global.config)).context("Failed to load configuration")
}

/// Connect to the configured database, honoring a URL override from the
/// command line or environment.
pub(crate) async fn connect(config: &Config, global: &GlobalArgs) -> Result<Arc<dyn Database>> {
    let url = config.resolve_database_url(global.database_url.as_deref());
    let db: Arc<dyn Database> = Arc::new(
        MySqlBackend::connect(url)
            .await
            .context("Failed to connect to database")?,
    );
    Ok(db)
}

/// Print an aligned table to stdout: header row, dash separator, data rows.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(String::len)
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    let render = |cells: &mut dyn Iterator<Item = String>| {
        let line: Vec<String> = cells
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        println!("{}", line.join("  ").trim_end());
    };

    render(&mut headers.iter().map(|h| h.to_string()));
    render(&mut widths.iter().map(|&w| "-".repeat(w)));
    for row in rows {
        render(&mut row.iter().cloned());
    }
}
