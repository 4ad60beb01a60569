//! # Quarry
//!
//! A probabilistic full-text search engine library.
//!
//! ## Features
//!
//! - Snapshot-isolated databases with a single writer and any number of readers
//! - Documents with positional terms, value slots and opaque data
//! - Composable queries: boolean, positional, value range, wildcard, synonym
//! - BM25 ranking, percentages, sorting, collapsing and match spies
//! - Relevance feedback term expansion
//! - A query parser with fields, ranges, stemming and spelling correction
//! - Database compaction

// Core modules
pub mod compactor;
mod database;
mod document;
pub mod enquire;
mod error;
mod expand;
mod iterator;
mod matcher;
pub mod posting_source;
mod query;
pub mod queryparser;
mod sortable;
mod storage;
pub mod text;
mod util;
mod weight;

/// Document identifier. Docids start at 1 and are never reused.
pub type DocId = u64;
/// A count of documents.
pub type DocCount = u64;
/// Within-document and within-query frequencies, and other term counts.
pub type TermCount = u32;
/// Position of a term within a document.
pub type TermPos = u32;
/// Number of a document value slot.
pub type ValueNo = u32;

/// A slot number meaning "no slot", used to turn collapsing off.
pub const BAD_VALUENO: ValueNo = ValueNo::MAX;

// Re-exports for the public API
pub use compactor::{Compactor, CompactorConfig, FirstWins, MetadataResolver};
pub use database::{CheckReport, Database, DatabaseConfig, WritableDatabase};
pub use document::Document;
pub use enquire::{
    DocidOrder, Enquire, KeyMaker, MSet, MSetItem, MatchDecider, MatchSpy, MultiValueKeyMaker,
    RSet, ValueCountMatchSpy, ValueSetMatchDecider,
};
pub use error::{ErrorKind, QuarryError, Result};
pub use expand::{ESet, ESetItem, ExpandDecider, ExpandDeciderFilterPrefix, ExpandFlags};
pub use iterator::{
    IterState, PositionIterator, PostingItem, PostingIterator, TermItem, TermIterator, ValueItem,
    ValueIterator,
};
pub use posting_source::{
    FixedWeightPostingSource, PostingSource, Registry, ValueMapPostingSource, ValuePostingSource,
    ValueWeightPostingSource,
};
pub use query::{Op, Query, WildcardLimit};
pub use queryparser::value_range::{
    DateValueRangeProcessor, NumberValueRangeProcessor, StringValueRangeProcessor, ValueRange,
    ValueRangeProcessor,
};
pub use queryparser::{FieldProcessor, ParseFlags, QueryParser};
pub use sortable::{sortable_serialise, sortable_unserialise};
pub use storage::disk::OpenMode;
pub use text::stem::{Stem, Stemmer};
pub use text::stopper::{SimpleStopper, Stopper};
pub use text::termgen::TermGenerator;
pub use text::{StemStrategy, StopStrategy};
pub use weight::{BM25Params, BM25Weight, BoolWeight, Weight, WeightStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
