use anyhow::{Context, Result, bail};
use quarry::Database;

use crate::cli::CheckCommand;
use crate::output::{self, OutputFormat};

/// Verify snapshot checksums and posting invariants.
pub fn run(cmd: CheckCommand, format: OutputFormat) -> Result<()> {
    let report = Database::check(&cmd.db)
        .with_context(|| format!("Failed to check database at {}", cmd.db.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            output::print_summary(
                &[
                    ("revision", report.revision.to_string()),
                    ("documents", report.doccount.to_string()),
                    ("terms", report.terms.to_string()),
                    ("errors", report.errors.len().to_string()),
                ],
                format,
            )?;
            for error in &report.errors {
                println!("{error}");
            }
        }
    }

    if !report.is_ok() {
        bail!("{} error(s) found in {}", report.errors.len(), cmd.db.display());
    }
    Ok(())
}
