//! External sources of postings.
//!
//! A [`PostingSource`] stands in for a leaf of the query tree: it supplies
//! its own sequence of matching docids together with a weight for each,
//! and declares bounds the matcher uses for estimates and percentages.
//!
//! The query holds a prototype. Every match clones it with
//! [`PostingSource::clone_box`] and calls [`PostingSource::init`] on the
//! clone, so the same query can run concurrently and repeatedly.

use std::collections::HashMap;
use std::fmt;

use crate::database::Database;
use crate::error::{QuarryError, Result};
use crate::iterator::{PostingIterator, ValueIterator};
use crate::sortable::sortable_unserialise;
use crate::util::pack::{Packer, Unpacker};
use crate::{DocCount, DocId, ValueNo};

/// A custom source of (docid, weight) postings.
pub trait PostingSource: Send + Sync {
    /// Prepare to iterate over `db`. Called once per match, before any
    /// positioning call.
    fn init(&mut self, db: &Database) -> Result<()>;

    fn termfreq_min(&self) -> DocCount;

    fn termfreq_est(&self) -> DocCount;

    fn termfreq_max(&self) -> DocCount;

    /// Upper bound on [`weight`](Self::weight).
    fn max_weight(&self) -> f64 {
        0.0
    }

    /// Weight of the current document.
    fn weight(&self) -> Result<f64> {
        Ok(0.0)
    }

    /// The current document. Only valid after positioning.
    fn docid(&self) -> DocId;

    /// Advance to the next document. `min_weight` is a hint: documents
    /// weighing less may be skipped.
    fn next(&mut self, min_weight: f64) -> Result<()>;

    /// Advance to the first document `>= docid`. Never moves backwards.
    fn skip_to(&mut self, docid: DocId, min_weight: f64) -> Result<()> {
        while !self.at_end() && self.docid() < docid {
            self.next(min_weight)?;
        }
        Ok(())
    }

    /// Check whether `docid` matches. Returns false if the source could tell
    /// cheaply that it does not; the source may then be left anywhere up to
    /// `docid`. Returns true after positioning as [`skip_to`](Self::skip_to)
    /// does.
    fn check(&mut self, docid: DocId, min_weight: f64) -> Result<bool> {
        self.skip_to(docid, min_weight)?;
        Ok(true)
    }

    fn at_end(&self) -> bool;

    /// A fresh, uninitialised copy of this source.
    fn clone_box(&self) -> Box<dyn PostingSource>;

    /// Registry name, if this source can be serialised.
    fn name(&self) -> Option<&str> {
        None
    }

    fn serialise(&self) -> Result<Vec<u8>> {
        Err(QuarryError::unimplemented(
            "serialise() not supported for this PostingSource",
        ))
    }

    fn description(&self) -> String {
        "PostingSource()".to_string()
    }
}

impl fmt::Debug for dyn PostingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

// ── Value-backed sources ──────────────────────────────────────────────

/// Cursor over one value slot shared by the value-backed sources.
#[derive(Debug, Clone)]
struct ValueCursor {
    slot: ValueNo,
    values: Option<ValueIterator>,
    current: Option<(DocId, Vec<u8>)>,
    started: bool,
    freq: DocCount,
}

impl ValueCursor {
    fn new(slot: ValueNo) -> Self {
        ValueCursor {
            slot,
            values: None,
            current: None,
            started: false,
            freq: 0,
        }
    }

    fn init(&mut self, db: &Database) -> Result<()> {
        self.values = Some(db.valuestream(self.slot)?);
        self.freq = db.get_value_freq(self.slot)?;
        self.current = None;
        self.started = false;
        Ok(())
    }

    fn iter(&mut self) -> Result<&mut ValueIterator> {
        self.values
            .as_mut()
            .ok_or_else(|| QuarryError::invalid_operation("PostingSource used before init()"))
    }

    fn next(&mut self) -> Result<()> {
        let found = self.iter()?.next();
        self.current = found.map(|item| (item.docid, item.value));
        self.started = true;
        Ok(())
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.started && self.current.as_ref().is_some_and(|(did, _)| *did >= docid) {
            return Ok(());
        }
        let found = self.iter()?.skip_to(docid);
        self.current = found.map(|item| (item.docid, item.value));
        self.started = true;
        Ok(())
    }

    fn check(&mut self, docid: DocId) -> Result<bool> {
        if !self.iter()?.check(docid) {
            return Ok(false);
        }
        self.skip_to(docid)?;
        Ok(true)
    }

    fn docid(&self) -> DocId {
        self.current.as_ref().map_or(0, |(docid, _)| *docid)
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(_, value)| value.as_slice())
    }

    fn at_end(&self) -> bool {
        self.started && self.current.is_none()
    }
}

macro_rules! delegate_cursor {
    () => {
        fn termfreq_min(&self) -> DocCount {
            self.cursor.freq
        }

        fn termfreq_est(&self) -> DocCount {
            self.cursor.freq
        }

        fn termfreq_max(&self) -> DocCount {
            self.cursor.freq
        }

        fn docid(&self) -> DocId {
            self.cursor.docid()
        }

        fn next(&mut self, _min_weight: f64) -> Result<()> {
            self.cursor.next()
        }

        fn skip_to(&mut self, docid: DocId, _min_weight: f64) -> Result<()> {
            self.cursor.skip_to(docid)
        }

        fn check(&mut self, docid: DocId, _min_weight: f64) -> Result<bool> {
            self.cursor.check(docid)
        }

        fn at_end(&self) -> bool {
            self.cursor.at_end()
        }
    };
}

/// Matches every document with a value in `slot`, with zero weight.
#[derive(Debug, Clone)]
pub struct ValuePostingSource {
    cursor: ValueCursor,
}

impl ValuePostingSource {
    pub fn new(slot: ValueNo) -> Self {
        ValuePostingSource {
            cursor: ValueCursor::new(slot),
        }
    }

    /// The current document's value.
    pub fn get_value(&self) -> &[u8] {
        self.cursor.value()
    }
}

impl PostingSource for ValuePostingSource {
    fn init(&mut self, db: &Database) -> Result<()> {
        self.cursor.init(db)
    }

    delegate_cursor!();

    fn clone_box(&self) -> Box<dyn PostingSource> {
        Box::new(ValuePostingSource::new(self.cursor.slot))
    }

    fn name(&self) -> Option<&str> {
        Some("ValuePostingSource")
    }

    fn serialise(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        packer.uint(u64::from(self.cursor.slot));
        Ok(packer.into_inner())
    }

    fn description(&self) -> String {
        format!("ValuePostingSource(slot={})", self.cursor.slot)
    }
}

/// Weights each document by the [`sortable_serialise`](crate::sortable_serialise)d
/// number stored in `slot`.
#[derive(Debug, Clone)]
pub struct ValueWeightPostingSource {
    cursor: ValueCursor,
    max_weight: f64,
}

impl ValueWeightPostingSource {
    pub fn new(slot: ValueNo) -> Self {
        ValueWeightPostingSource {
            cursor: ValueCursor::new(slot),
            max_weight: 0.0,
        }
    }
}

impl PostingSource for ValueWeightPostingSource {
    fn init(&mut self, db: &Database) -> Result<()> {
        self.cursor.init(db)?;
        let upper = db.get_value_upper_bound(self.cursor.slot)?;
        self.max_weight = if upper.is_empty() {
            0.0
        } else {
            sortable_unserialise(&upper).max(0.0)
        };
        Ok(())
    }

    delegate_cursor!();

    fn max_weight(&self) -> f64 {
        self.max_weight
    }

    fn weight(&self) -> Result<f64> {
        Ok(sortable_unserialise(self.cursor.value()))
    }

    fn clone_box(&self) -> Box<dyn PostingSource> {
        Box::new(ValueWeightPostingSource::new(self.cursor.slot))
    }

    fn name(&self) -> Option<&str> {
        Some("ValueWeightPostingSource")
    }

    fn serialise(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        packer.uint(u64::from(self.cursor.slot));
        Ok(packer.into_inner())
    }

    fn description(&self) -> String {
        format!("ValueWeightPostingSource(slot={})", self.cursor.slot)
    }
}

/// Weights each document by looking its value in `slot` up in a map.
#[derive(Debug, Clone)]
pub struct ValueMapPostingSource {
    cursor: ValueCursor,
    weights: HashMap<Vec<u8>, f64>,
    default_weight: f64,
}

impl ValueMapPostingSource {
    pub fn new(slot: ValueNo) -> Self {
        ValueMapPostingSource {
            cursor: ValueCursor::new(slot),
            weights: HashMap::new(),
            default_weight: 0.0,
        }
    }

    pub fn add_mapping<V: Into<Vec<u8>>>(&mut self, value: V, weight: f64) {
        self.weights.insert(value.into(), weight);
    }

    pub fn clear_mappings(&mut self) {
        self.weights.clear();
    }

    /// Weight for values with no mapping.
    pub fn set_default_weight(&mut self, weight: f64) {
        self.default_weight = weight;
    }
}

impl PostingSource for ValueMapPostingSource {
    fn init(&mut self, db: &Database) -> Result<()> {
        self.cursor.init(db)
    }

    delegate_cursor!();

    fn max_weight(&self) -> f64 {
        self.weights
            .values()
            .copied()
            .fold(self.default_weight, f64::max)
    }

    fn weight(&self) -> Result<f64> {
        Ok(self
            .weights
            .get(self.cursor.value())
            .copied()
            .unwrap_or(self.default_weight))
    }

    fn clone_box(&self) -> Box<dyn PostingSource> {
        let mut fresh = self.clone();
        fresh.cursor = ValueCursor::new(self.cursor.slot);
        Box::new(fresh)
    }

    fn name(&self) -> Option<&str> {
        Some("ValueMapPostingSource")
    }

    fn serialise(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        packer
            .uint(u64::from(self.cursor.slot))
            .f64(self.default_weight)
            .uint(self.weights.len() as u64);
        let mut mappings: Vec<_> = self.weights.iter().collect();
        mappings.sort_by(|a, b| a.0.cmp(b.0));
        for (value, weight) in mappings {
            packer.bytes(value).f64(*weight);
        }
        Ok(packer.into_inner())
    }

    fn description(&self) -> String {
        format!("ValueMapPostingSource(slot={})", self.cursor.slot)
    }
}

// ── Fixed weight ──────────────────────────────────────────────────────

/// Matches every document with the same weight.
#[derive(Debug, Clone)]
pub struct FixedWeightPostingSource {
    weight: f64,
    docs: Option<PostingIterator>,
    current: Option<DocId>,
    started: bool,
    doccount: DocCount,
}

impl FixedWeightPostingSource {
    pub fn new(weight: f64) -> Self {
        FixedWeightPostingSource {
            weight,
            docs: None,
            current: None,
            started: false,
            doccount: 0,
        }
    }

    fn docs(&mut self) -> Result<&mut PostingIterator> {
        self.docs
            .as_mut()
            .ok_or_else(|| QuarryError::invalid_operation("PostingSource used before init()"))
    }
}

impl PostingSource for FixedWeightPostingSource {
    fn init(&mut self, db: &Database) -> Result<()> {
        self.docs = Some(db.postlist(b"")?);
        self.doccount = db.get_doccount()?;
        self.current = None;
        self.started = false;
        Ok(())
    }

    fn termfreq_min(&self) -> DocCount {
        self.doccount
    }

    fn termfreq_est(&self) -> DocCount {
        self.doccount
    }

    fn termfreq_max(&self) -> DocCount {
        self.doccount
    }

    fn max_weight(&self) -> f64 {
        self.weight
    }

    fn weight(&self) -> Result<f64> {
        Ok(self.weight)
    }

    fn docid(&self) -> DocId {
        self.current.unwrap_or(0)
    }

    fn next(&mut self, _min_weight: f64) -> Result<()> {
        self.current = self.docs()?.next().map(|item| item.docid());
        self.started = true;
        Ok(())
    }

    fn skip_to(&mut self, docid: DocId, _min_weight: f64) -> Result<()> {
        if self.started && self.current.is_some_and(|current| current >= docid) {
            return Ok(());
        }
        self.current = self.docs()?.skip_to(docid).map(|item| item.docid());
        self.started = true;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.started && self.current.is_none()
    }

    fn clone_box(&self) -> Box<dyn PostingSource> {
        Box::new(FixedWeightPostingSource::new(self.weight))
    }

    fn name(&self) -> Option<&str> {
        Some("FixedWeightPostingSource")
    }

    fn serialise(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        packer.f64(self.weight);
        Ok(packer.into_inner())
    }

    fn description(&self) -> String {
        format!("FixedWeightPostingSource(wt={})", self.weight)
    }
}

// ── Registry ──────────────────────────────────────────────────────────

/// Rebuilds a posting source from its serialised parameters.
pub type PostingSourceFactory = fn(&[u8]) -> Result<Box<dyn PostingSource>>;

/// Posting source constructors by name, used by
/// [`Query::unserialise_with`](crate::Query::unserialise_with).
#[derive(Clone)]
pub struct Registry {
    sources: HashMap<String, PostingSourceFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Registry {
            sources: HashMap::new(),
        };
        registry.register_posting_source("ValuePostingSource", |bytes| {
            let slot = read_slot(bytes)?;
            Ok(Box::new(ValuePostingSource::new(slot)))
        });
        registry.register_posting_source("ValueWeightPostingSource", |bytes| {
            let slot = read_slot(bytes)?;
            Ok(Box::new(ValueWeightPostingSource::new(slot)))
        });
        registry.register_posting_source("ValueMapPostingSource", |bytes| {
            let mut unpacker = Unpacker::new(bytes);
            let slot = unpacker.u32()?;
            let mut source = ValueMapPostingSource::new(slot);
            source.set_default_weight(unpacker.f64()?);
            for _ in 0..unpacker.uint()? {
                let value = unpacker.bytes()?.to_vec();
                source.add_mapping(value, unpacker.f64()?);
            }
            unpacker.finish()?;
            Ok(Box::new(source))
        });
        registry.register_posting_source("FixedWeightPostingSource", |bytes| {
            let mut unpacker = Unpacker::new(bytes);
            let weight = unpacker.f64()?;
            unpacker.finish()?;
            Ok(Box::new(FixedWeightPostingSource::new(weight)))
        });
        registry
    }
}

fn read_slot(bytes: &[u8]) -> Result<ValueNo> {
    let mut unpacker = Unpacker::new(bytes);
    let slot = unpacker.u32()?;
    unpacker.finish()?;
    Ok(slot)
}

impl Registry {
    /// A registry knowing the built-in posting sources.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_posting_source(&mut self, name: &str, factory: PostingSourceFactory) {
        self.sources.insert(name.to_string(), factory);
    }

    pub(crate) fn posting_source(&self, name: &str, params: &[u8]) -> Result<Box<dyn PostingSource>> {
        let factory = self.sources.get(name).ok_or_else(|| {
            QuarryError::serialisation(format!("PostingSource {name} not registered"))
        })?;
        factory(params)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.sources.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("posting_sources", &names).finish()
    }
}
