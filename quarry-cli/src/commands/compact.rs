use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use quarry::{Compactor, CompactorConfig};

use crate::cli::CompactCommand;
use crate::output::{self, OutputFormat, TableStatusRow};

/// Merge the source databases into the destination.
pub fn run(cmd: CompactCommand, format: OutputFormat) -> Result<()> {
    let config = CompactorConfig::default()
        .with_renumber(!cmd.no_renumber)
        .with_multipass(cmd.multipass)
        .with_block_size(cmd.block_size);
    let mut compactor = Compactor::with_config(config);
    for source in &cmd.sources {
        compactor.add_source(source);
    }
    compactor.set_destdir(&cmd.dest);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    compactor.set_status_callback(move |table, status| {
        if let Ok(mut rows) = sink.lock() {
            rows.push(TableStatusRow {
                table: table.to_string(),
                status: status.to_string(),
            });
        }
    });

    compactor
        .compact()
        .with_context(|| format!("Failed to compact into {}", cmd.dest.display()))?;

    let rows = progress
        .lock()
        .map(|mut rows| std::mem::take(&mut *rows))
        .unwrap_or_default();
    output::print_rows(&rows, format, "Nothing to compact.")
}
