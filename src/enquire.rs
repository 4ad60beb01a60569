//! Running queries: the [`Enquire`] session and its result types.
//!
//! An `Enquire` holds a query plus the options for ranking it. Each call to
//! [`Enquire::get_mset`] pins the database's current generation and runs a
//! fresh match against it, so a session can be reused across commits once
//! the database has been reopened.

pub(crate) mod decider;
pub(crate) mod mset;
pub(crate) mod sort;
pub(crate) mod spy;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub use decider::{MatchDecider, ValueSetMatchDecider};
pub use mset::{MSet, MSetItem};
pub use sort::{DocidOrder, KeyMaker, MultiValueKeyMaker};
pub use spy::{MatchSpy, ValueCountMatchSpy};

use crate::database::Database;
use crate::error::{QuarryError, Result};
use crate::expand::{self, ESet, ExpandDecider, ExpandFlags, ExpandRequest};
use crate::iterator::TermIterator;
use crate::matcher::{self, MatchOptions};
use crate::query::Query;
use crate::weight::{BM25Weight, Weight};
use crate::{BAD_VALUENO, DocCount, DocId, ValueNo};
use sort::{Order, SortBy, SortKey};

// ── RSet ──────────────────────────────────────────────────────────────

/// Documents marked as relevant, used for relevance feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RSet {
    docids: BTreeSet<DocId>,
}

impl RSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, docid: DocId) {
        self.docids.insert(docid);
    }

    pub fn remove_document(&mut self, docid: DocId) {
        self.docids.remove(&docid);
    }

    pub fn contains(&self, docid: DocId) -> bool {
        self.docids.contains(&docid)
    }

    pub fn size(&self) -> usize {
        self.docids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docids.is_empty()
    }

    /// Docids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docids.iter().copied()
    }

    pub fn get_description(&self) -> String {
        let ids: Vec<String> = self.docids.iter().map(ToString::to_string).collect();
        format!("RSet({})", ids.join(","))
    }
}

impl FromIterator<DocId> for RSet {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        RSet {
            docids: iter.into_iter().collect(),
        }
    }
}

// ── Enquire ───────────────────────────────────────────────────────────

/// A query session against one [`Database`].
pub struct Enquire {
    db: Database,
    query: Query,
    weight: Box<dyn Weight>,
    docid_order: DocidOrder,
    percent_cutoff: u32,
    weight_cutoff: f64,
    collapse_slot: ValueNo,
    collapse_max: DocCount,
    sort_by: SortBy,
    sort_key: Option<SortKey>,
    sort_reverse: bool,
    spies: Vec<Arc<dyn MatchSpy>>,
}

impl Enquire {
    pub fn new(db: &Database) -> Self {
        Enquire {
            db: db.clone(),
            query: Query::default(),
            weight: Box::new(BM25Weight::default()),
            docid_order: DocidOrder::Ascending,
            percent_cutoff: 0,
            weight_cutoff: 0.0,
            collapse_slot: BAD_VALUENO,
            collapse_max: 1,
            sort_by: SortBy::Relevance,
            sort_key: None,
            sort_reverse: false,
            spies: Vec::new(),
        }
    }

    pub fn set_query(&mut self, query: Query) {
        self.query = query;
    }

    pub fn get_query(&self) -> &Query {
        &self.query
    }

    /// Replace the weighting scheme. BM25 with default parameters is used
    /// until this is called.
    pub fn set_weighting_scheme<W: Weight + 'static>(&mut self, weight: W) {
        self.weight = Box::new(weight);
    }

    pub fn set_docid_order(&mut self, order: DocidOrder) {
        self.docid_order = order;
    }

    /// Drop results scoring under `percent` percent or under `weight`.
    /// Zero disables either cutoff.
    pub fn set_cutoff(&mut self, percent: u32, weight: f64) -> Result<()> {
        if percent > 100 {
            return Err(QuarryError::invalid_argument(format!(
                "Percentage cutoff must be in range 0 to 100, not {percent}"
            )));
        }
        self.percent_cutoff = percent;
        self.weight_cutoff = weight;
        Ok(())
    }

    /// Keep at most `collapse_max` results for each distinct value in
    /// `slot`. [`BAD_VALUENO`] turns collapsing off.
    pub fn set_collapse_key(&mut self, slot: ValueNo, collapse_max: DocCount) {
        self.collapse_slot = slot;
        self.collapse_max = collapse_max.max(1);
    }

    // ── Sorting ─────────────────────────────────────────────────────

    pub fn set_sort_by_relevance(&mut self) {
        self.sort_by = SortBy::Relevance;
        self.sort_key = None;
    }

    pub fn set_sort_by_value(&mut self, slot: ValueNo, reverse: bool) {
        self.set_sort(SortBy::Key, SortKey::Value(slot), reverse);
    }

    pub fn set_sort_by_key<K: KeyMaker + 'static>(&mut self, maker: K, reverse: bool) {
        self.set_sort(SortBy::Key, SortKey::Maker(Arc::new(maker)), reverse);
    }

    pub fn set_sort_by_value_then_relevance(&mut self, slot: ValueNo, reverse: bool) {
        self.set_sort(SortBy::KeyThenRelevance, SortKey::Value(slot), reverse);
    }

    pub fn set_sort_by_key_then_relevance<K: KeyMaker + 'static>(&mut self, maker: K, reverse: bool) {
        self.set_sort(SortBy::KeyThenRelevance, SortKey::Maker(Arc::new(maker)), reverse);
    }

    pub fn set_sort_by_relevance_then_value(&mut self, slot: ValueNo, reverse: bool) {
        self.set_sort(SortBy::RelevanceThenKey, SortKey::Value(slot), reverse);
    }

    pub fn set_sort_by_relevance_then_key<K: KeyMaker + 'static>(&mut self, maker: K, reverse: bool) {
        self.set_sort(SortBy::RelevanceThenKey, SortKey::Maker(Arc::new(maker)), reverse);
    }

    fn set_sort(&mut self, by: SortBy, key: SortKey, reverse: bool) {
        self.sort_by = by;
        self.sort_key = Some(key);
        self.sort_reverse = reverse;
    }

    // ── Spies ───────────────────────────────────────────────────────

    /// Register a spy to see every document which survives filtering.
    /// The caller keeps its own `Arc` to read the tallies afterwards.
    pub fn add_matchspy(&mut self, spy: Arc<dyn MatchSpy>) {
        self.spies.push(spy);
    }

    pub fn clear_matchspies(&mut self) {
        self.spies.clear();
    }

    // ── Matching ────────────────────────────────────────────────────

    /// Results `first .. first + maxitems` of the ranking.
    pub fn get_mset(&self, first: usize, maxitems: usize) -> Result<MSet> {
        self.get_mset_with(first, maxitems, None, None)
    }

    /// As [`get_mset`](Self::get_mset), weighting with relevance feedback
    /// from `rset` and keeping only documents `decider` accepts.
    pub fn get_mset_with(
        &self,
        first: usize,
        maxitems: usize,
        rset: Option<&RSet>,
        decider: Option<&dyn MatchDecider>,
    ) -> Result<MSet> {
        let generation = self.db.generation()?;
        let options = MatchOptions {
            first,
            maxitems,
            weight: self.weight.as_ref(),
            rset,
            decider,
            spies: &self.spies,
            order: Order {
                by: if self.sort_key.is_some() { self.sort_by } else { SortBy::Relevance },
                reverse: self.sort_reverse,
                docid_order: self.docid_order,
            },
            sort_key: self.sort_key.as_ref(),
            collapse: (self.collapse_slot != BAD_VALUENO).then_some((self.collapse_slot, self.collapse_max)),
            percent_cutoff: self.percent_cutoff,
            weight_cutoff: self.weight_cutoff,
        };
        matcher::run(generation, &self.query, &options)
    }

    /// Query terms indexing `docid`, in query order.
    pub fn get_matching_terms(&self, docid: DocId) -> Result<TermIterator> {
        let generation = self.db.generation()?;
        let doc = generation.doc(docid)?;
        let terms = self
            .query
            .terms_in_query_order()
            .into_iter()
            .filter(|term| doc.content.terms.contains_key(term))
            .collect();
        Ok(TermIterator::plain(terms))
    }

    // ── Expansion ───────────────────────────────────────────────────

    /// Up to `maxitems` terms to expand the query with, taken from the
    /// documents in `rset`. Query terms are left out.
    pub fn get_eset(&self, maxitems: usize, rset: &RSet) -> Result<ESet> {
        self.get_eset_with(maxitems, rset, ExpandFlags::NONE, None, 0.0)
    }

    pub fn get_eset_with(
        &self,
        maxitems: usize,
        rset: &RSet,
        flags: ExpandFlags,
        decider: Option<&dyn ExpandDecider>,
        min_weight: f64,
    ) -> Result<ESet> {
        let generation = self.db.generation()?;
        let query_terms = self.query.unique_terms();
        expand::expand(
            &generation,
            rset,
            &ExpandRequest {
                maxitems,
                flags,
                decider,
                min_weight,
                query_terms: &query_terms,
            },
        )
    }

    pub fn get_description(&self) -> String {
        format!(
            "Enquire({}, weight={}, spies={})",
            self.query.get_description(),
            self.weight.name(),
            self.spies.len()
        )
    }
}

impl fmt::Debug for Enquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}
