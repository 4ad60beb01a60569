use anyhow::{Context, Result};
use quarry::Database;

use crate::cli::DelveCommand;
use crate::output::{self, OutputFormat, PostingRow, TermRow, ValueRow, display_bytes};

/// Show a database summary, or the postings, documents and value streams
/// asked for.
pub fn run(cmd: DelveCommand, format: OutputFormat) -> Result<()> {
    let db = Database::open(&cmd.db)
        .with_context(|| format!("Failed to open database at {}", cmd.db.display()))?;

    if cmd.term.is_empty() && cmd.docid.is_empty() && cmd.value.is_empty() {
        return output::print_summary(
            &[
                ("uuid", db.get_uuid()?.to_string()),
                ("revision", db.get_revision()?.to_string()),
                ("documents", db.get_doccount()?.to_string()),
                ("last docid", db.get_lastdocid()?.to_string()),
                ("average length", format!("{:.2}", db.get_avlength()?)),
                ("has positions", db.has_positions()?.to_string()),
            ],
            format,
        );
    }

    for term in &cmd.term {
        let rows: Vec<PostingRow> = db
            .postlist(term)?
            .map(|posting| PostingRow {
                docid: posting.docid(),
                wdf: posting.wdf(),
                doclength: posting.doclength(),
            })
            .collect();
        log::debug!("term {term:?} has {} postings", rows.len());
        output::print_rows(&rows, format, &format!("Term '{term}' not found."))?;
    }

    for &docid in &cmd.docid {
        let doc = db
            .get_document(docid)
            .with_context(|| format!("Failed to read document {docid}"))?;
        let mut rows = Vec::new();
        for item in db.termlist(docid)? {
            let positions: Vec<String> = item.positions()?.map(|pos| pos.to_string()).collect();
            rows.push(TermRow {
                term: display_bytes(item.term()),
                wdf: item.wdf()?,
                termfreq: item.termfreq()?,
                positions: positions.join(" "),
            });
        }
        output::print_rows(&rows, format, &format!("Document {docid} has no terms."))?;

        let values: Vec<ValueRow> = doc
            .values()
            .map(|(slot, value)| ValueRow {
                docid,
                slot,
                value: display_bytes(value),
            })
            .collect();
        output::print_rows(&values, format, &format!("Document {docid} has no values."))?;
        output::print_summary(&[("data", display_bytes(doc.get_data()))], format)?;
    }

    for &slot in &cmd.value {
        let rows: Vec<ValueRow> = db
            .valuestream(slot)?
            .map(|item| ValueRow {
                docid: item.docid,
                slot,
                value: display_bytes(&item.value),
            })
            .collect();
        output::print_rows(&rows, format, &format!("Slot {slot} is empty."))?;
    }
    Ok(())
}
