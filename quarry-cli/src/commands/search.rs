use anyhow::{Context, Result};
use quarry::{Database, Enquire, Op, ParseFlags, QueryParser, Stem};

use crate::cli::SearchCommand;
use crate::output::{self, HitRow, OutputFormat, display_bytes};

/// Parse the query and print one page of matches.
pub fn run(cmd: SearchCommand, format: OutputFormat) -> Result<()> {
    let db = Database::open(&cmd.db)
        .with_context(|| format!("Failed to open database at {}", cmd.db.display()))?;

    let mut parser = QueryParser::new();
    parser.set_stemmer(Stem::new(&cmd.stem).with_context(|| format!("Unknown stemmer '{}'", cmd.stem))?);
    parser.set_database(&db);
    if cmd.and {
        parser.set_default_op(Op::And)?;
    }
    let text = cmd.query.join(" ");
    let query = parser
        .parse_query(&text, ParseFlags::DEFAULT | ParseFlags::WILDCARD | ParseFlags::SPELLING_CORRECTION)
        .with_context(|| format!("Failed to parse query '{text}'"))?;
    log::debug!("running {}", query.get_description());

    let mut enquire = Enquire::new(&db);
    enquire.set_query(query);
    let mset = enquire.get_mset(cmd.offset, cmd.limit)?;

    let mut rows = Vec::with_capacity(mset.size());
    for (index, item) in mset.iter().enumerate() {
        let doc = mset.get_document(index)?;
        let data = display_bytes(doc.get_data());
        rows.push(HitRow {
            rank: item.rank() + 1,
            docid: item.docid(),
            percent: item.percent(),
            weight: format!("{:.4}", item.weight()),
            data: data.chars().take(60).collect(),
        });
    }

    if let OutputFormat::Table = format {
        let corrected = parser.get_corrected_query_string();
        if !corrected.is_empty() {
            println!("Did you mean: {corrected}");
        }
        println!(
            "About {} matching documents (showing {})",
            mset.get_matches_estimated(),
            mset.size()
        );
    }
    output::print_rows(&rows, format, "No results found.")
}
