use std::fs;

use anyhow::{Context, Result};
use quarry::{Document, OpenMode, Stem, TermGenerator, WritableDatabase};

use crate::cli::IndexCommand;
use crate::output::{self, OutputFormat};

/// Index each file (or each paragraph of each file) as a document.
pub fn run(cmd: IndexCommand, format: OutputFormat) -> Result<()> {
    let db = WritableDatabase::open(&cmd.db, OpenMode::CreateOrOpen)
        .with_context(|| format!("Failed to open database at {}", cmd.db.display()))?;
    let stemmer = Stem::new(&cmd.stem).with_context(|| format!("Unknown stemmer '{}'", cmd.stem))?;

    let mut indexer = TermGenerator::new();
    indexer.set_stemmer(stemmer);

    let mut added = 0u64;
    for path in &cmd.files {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let records: Vec<&str> = if cmd.paragraphs {
            text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect()
        } else {
            vec![text.as_str()]
        };
        for record in records {
            let mut doc = Document::new();
            doc.set_data(record.as_bytes().to_vec());
            indexer.set_document(doc);
            indexer.index_text(record, 1, "")?;
            db.add_document(indexer.get_document().clone())?;
            added += 1;
        }
        log::info!("indexed {}", path.display());
    }
    db.commit().context("Failed to commit")?;

    let reader = db.reader()?;
    output::print_summary(
        &[
            ("added", added.to_string()),
            ("documents", reader.get_doccount()?.to_string()),
            ("revision", reader.get_revision()?.to_string()),
        ],
        format,
    )
}
