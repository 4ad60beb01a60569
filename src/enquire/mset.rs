//! Match sets: one page of ranked results plus match statistics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::Document;
use crate::error::{QuarryError, Result};
use crate::matcher::{Bounds, percent};
use crate::storage::Generation;
use crate::util::escape::escape_bytes;
use crate::{DocCount, DocId};

/// Frequency and maximum weight of one query term.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TermInfo {
    pub termfreq: DocCount,
    pub termweight: f64,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct MSetItem {
    pub(crate) docid: DocId,
    pub(crate) rank: usize,
    pub(crate) weight: f64,
    pub(crate) percent: i32,
    pub(crate) collapse_key: Vec<u8>,
    pub(crate) collapse_count: DocCount,
    pub(crate) sort_key: Vec<u8>,
}

impl MSetItem {
    pub fn docid(&self) -> DocId {
        self.docid
    }

    /// Zero-based rank over the whole result list, not just this page.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn percent(&self) -> i32 {
        self.percent
    }

    pub fn collapse_key(&self) -> &[u8] {
        &self.collapse_key
    }

    /// Lower bound on the documents with this collapse key which were
    /// dropped from the results.
    pub fn collapse_count(&self) -> DocCount {
        self.collapse_count
    }

    pub fn sort_key(&self) -> &[u8] {
        &self.sort_key
    }
}

/// Results of [`Enquire::get_mset`](crate::Enquire::get_mset).
#[derive(Default)]
pub struct MSet {
    generation: Option<Arc<Generation>>,
    firstitem: usize,
    items: Vec<MSetItem>,
    matches: Bounds,
    uncollapsed: Bounds,
    max_possible: f64,
    max_attained: f64,
    percent_scale: f64,
    terms: BTreeMap<Vec<u8>, TermInfo>,
    fetched: Mutex<HashMap<DocId, Document>>,
}

impl MSet {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        generation: Arc<Generation>,
        firstitem: usize,
        items: Vec<MSetItem>,
        matches: Bounds,
        max_possible: f64,
        max_attained: f64,
        percent_scale: f64,
        terms: BTreeMap<Vec<u8>, TermInfo>,
    ) -> Self {
        MSet {
            generation: Some(generation),
            firstitem,
            items,
            matches,
            uncollapsed: matches,
            max_possible,
            max_attained,
            percent_scale,
            terms,
            fetched: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_uncollapsed(&mut self, bounds: Bounds) {
        self.uncollapsed = bounds;
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MSetItem> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&MSetItem> {
        self.items.get(index)
    }

    /// Rank of the first item in this page.
    pub fn get_firstitem(&self) -> usize {
        self.firstitem
    }

    pub fn get_matches_lower_bound(&self) -> DocCount {
        self.matches.lower
    }

    pub fn get_matches_estimated(&self) -> DocCount {
        self.matches.estimated
    }

    pub fn get_matches_upper_bound(&self) -> DocCount {
        self.matches.upper
    }

    pub fn get_uncollapsed_matches_lower_bound(&self) -> DocCount {
        self.uncollapsed.lower
    }

    pub fn get_uncollapsed_matches_estimated(&self) -> DocCount {
        self.uncollapsed.estimated
    }

    pub fn get_uncollapsed_matches_upper_bound(&self) -> DocCount {
        self.uncollapsed.upper
    }

    /// Upper bound on the weight any document could have scored.
    pub fn get_max_possible(&self) -> f64 {
        self.max_possible
    }

    /// Highest weight actually scored by a matching document.
    pub fn get_max_attained(&self) -> f64 {
        self.max_attained
    }

    /// Documents indexed by `term`. Query terms come from the match
    /// statistics; other terms are looked up in the matched snapshot.
    pub fn get_termfreq<T: AsRef<[u8]>>(&self, term: T) -> Result<DocCount> {
        let term = term.as_ref();
        if let Some(info) = self.terms.get(term) {
            return Ok(info.termfreq);
        }
        match &self.generation {
            Some(generation) => Ok(generation.termfreq(term)),
            None => Err(QuarryError::invalid_operation(format!(
                "Can't get termfreq of '{}' from an empty MSet",
                escape_bytes(term)
            ))),
        }
    }

    /// Maximum weight `term` contributed to the query, 0 for terms which
    /// weren't in it.
    pub fn get_termweight<T: AsRef<[u8]>>(&self, term: T) -> f64 {
        self.terms.get(term.as_ref()).map_or(0.0, |info| info.termweight)
    }

    pub fn convert_to_percent(&self, weight: f64) -> i32 {
        percent(weight, self.percent_scale)
    }

    /// The document at `index` in this page.
    pub fn get_document(&self, index: usize) -> Result<Document> {
        let item = self.items.get(index).ok_or_else(|| {
            QuarryError::range(format!(
                "MSet index {index} out of range (size {})",
                self.items.len()
            ))
        })?;
        if let Some(doc) = self.fetched.lock().get(&item.docid) {
            return Ok(doc.clone());
        }
        let doc = self.load(item.docid)?;
        self.fetched.lock().insert(item.docid, doc.clone());
        Ok(doc)
    }

    /// Load every document in this page ahead of use.
    pub fn fetch(&self) -> Result<()> {
        let mut fetched = self.fetched.lock();
        for item in &self.items {
            if !fetched.contains_key(&item.docid) {
                let doc = self.load(item.docid)?;
                fetched.insert(item.docid, doc);
            }
        }
        Ok(())
    }

    fn load(&self, docid: DocId) -> Result<Document> {
        let generation = self
            .generation
            .as_ref()
            .ok_or(QuarryError::DocNotFound(docid))?;
        let content = Arc::clone(&generation.doc(docid)?.content);
        Ok(Document::from_stored(docid, content, Arc::clone(generation)))
    }

    pub fn get_description(&self) -> String {
        let items: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{}:{:.4}", item.docid, item.weight))
            .collect();
        format!(
            "MSet(firstitem={}, matches={}..{}..{}, max_possible={:.4}, max_attained={:.4}, items=[{}])",
            self.firstitem,
            self.matches.lower,
            self.matches.estimated,
            self.matches.upper,
            self.max_possible,
            self.max_attained,
            items.join(", ")
        )
    }
}

impl<'a> IntoIterator for &'a MSet {
    type Item = &'a MSetItem;
    type IntoIter = std::slice::Iter<'a, MSetItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Debug for MSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}
