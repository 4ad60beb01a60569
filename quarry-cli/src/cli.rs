use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Quarry - probabilistic full-text search CLI
#[derive(Parser)]
#[command(name = "quarry", version, about)]
pub struct Cli {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect a database: summary, postings, documents or values.
    Delve(DelveCommand),
    /// Parse and run a query.
    Search(SearchCommand),
    /// Index text files, creating the database if needed.
    Index(IndexCommand),
    /// Merge databases into a new compact database.
    Compact(CompactCommand),
    /// Verify a database.
    Check(CheckCommand),
}

#[derive(Args)]
pub struct DelveCommand {
    /// Database directory.
    pub db: PathBuf,

    /// Show the posting list of a term.
    #[arg(short = 't', long)]
    pub term: Vec<String>,

    /// Show the termlist, values and data of a document.
    #[arg(short = 'd', long)]
    pub docid: Vec<u64>,

    /// Show the value stream of a slot.
    #[arg(short = 'V', long)]
    pub value: Vec<u32>,
}

#[derive(Args)]
pub struct SearchCommand {
    /// Database directory.
    pub db: PathBuf,

    /// Query string.
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Maximum number of results.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Number of results to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Stemming language ("none" to disable).
    #[arg(long, default_value = "english")]
    pub stem: String,

    /// Combine words with AND instead of OR.
    #[arg(long)]
    pub and: bool,
}

#[derive(Args)]
pub struct IndexCommand {
    /// Database directory.
    pub db: PathBuf,

    /// Text files to index.
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Index each blank-line separated paragraph as its own document.
    #[arg(long)]
    pub paragraphs: bool,

    /// Stemming language ("none" to disable).
    #[arg(long, default_value = "english")]
    pub stem: String,
}

#[derive(Args)]
pub struct CompactCommand {
    /// Destination directory.
    pub dest: PathBuf,

    /// Source database directories.
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Keep the source docids instead of renumbering.
    #[arg(long)]
    pub no_renumber: bool,

    /// Merge in several passes.
    #[arg(long)]
    pub multipass: bool,

    /// Snapshot write block size.
    #[arg(long, default_value_t = 8192)]
    pub block_size: usize,
}

#[derive(Args)]
pub struct CheckCommand {
    /// Database directory.
    pub db: PathBuf,
}
