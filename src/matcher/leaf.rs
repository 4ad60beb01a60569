//! Leaf postlists: terms, value ranges, posting sources and the empty list.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::matcher::PostList;
use crate::posting_source::PostingSource;
use crate::storage::{Generation, PostingList, ValueStream};
use crate::weight::Weight;
use crate::{DocCount, DocId, TermCount, TermPos};

// ── Term ──────────────────────────────────────────────────────────────

/// Postings of one term, optionally weighted.
pub(crate) struct TermPostList {
    list: Arc<PostingList>,
    /// `None` before the first move; `list.entries.len()` once exhausted.
    pos: Option<usize>,
    weight: Option<Box<dyn Weight>>,
    generation: Arc<Generation>,
    term: Vec<u8>,
}

impl TermPostList {
    pub fn new(
        generation: Arc<Generation>,
        term: Vec<u8>,
        list: Arc<PostingList>,
        weight: Option<Box<dyn Weight>>,
    ) -> Self {
        TermPostList {
            list,
            pos: None,
            weight,
            generation,
            term,
        }
    }

    fn current(&self) -> Option<&crate::storage::PostingEntry> {
        self.pos.and_then(|pos| self.list.entries.get(pos))
    }
}

impl PostList for TermPostList {
    fn termfreq_min(&self) -> DocCount {
        self.list.termfreq()
    }

    fn termfreq_est(&self) -> DocCount {
        self.list.termfreq()
    }

    fn termfreq_max(&self) -> DocCount {
        self.list.termfreq()
    }

    fn max_weight(&self) -> f64 {
        self.weight.as_ref().map_or(0.0, |w| w.maxpart())
    }

    fn docid(&self) -> DocId {
        self.current().map_or(0, |entry| entry.docid)
    }

    fn at_end(&self) -> bool {
        self.pos.is_some_and(|pos| pos >= self.list.entries.len())
    }

    fn next(&mut self) -> Result<()> {
        self.pos = Some(self.pos.map_or(0, |pos| (pos + 1).min(self.list.entries.len())));
        Ok(())
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.current().is_some_and(|entry| entry.docid >= docid) || self.at_end() {
            return Ok(());
        }
        let from = self.pos.map_or(0, |pos| pos + 1);
        let idx = from + self.list.entries[from..].partition_point(|e| e.docid < docid);
        self.pos = Some(idx);
        Ok(())
    }

    fn weight(&self) -> Result<f64> {
        let (Some(weight), Some(entry)) = (&self.weight, self.current()) else {
            return Ok(0.0);
        };
        let doclength = self.generation.doclength(entry.docid)?;
        Ok(weight.sumpart(entry.wdf, doclength))
    }

    fn count_matching_subqs(&self) -> usize {
        usize::from(self.weight.is_some())
    }

    fn wdf(&self) -> TermCount {
        self.current().map_or(0, |entry| entry.wdf)
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        let Some(entry) = self.current() else {
            return Ok(Vec::new());
        };
        Ok(self
            .generation
            .doc(entry.docid)?
            .content
            .terms
            .get(&self.term)
            .map(|t| t.positions.clone())
            .unwrap_or_default())
    }
}

// ── Empty ─────────────────────────────────────────────────────────────

/// Matches nothing.
pub(crate) struct EmptyPostList;

impl PostList for EmptyPostList {
    fn termfreq_min(&self) -> DocCount {
        0
    }

    fn termfreq_est(&self) -> DocCount {
        0
    }

    fn termfreq_max(&self) -> DocCount {
        0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn docid(&self) -> DocId {
        0
    }

    fn at_end(&self) -> bool {
        true
    }

    fn next(&mut self) -> Result<()> {
        Ok(())
    }

    fn skip_to(&mut self, _docid: DocId) -> Result<()> {
        Ok(())
    }

    fn weight(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn count_matching_subqs(&self) -> usize {
        0
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        Ok(Vec::new())
    }
}

// ── Value range ───────────────────────────────────────────────────────

/// Documents whose value in a slot lies within inclusive bounds.
pub(crate) struct ValueRangePostList {
    stream: Arc<ValueStream>,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    current: Option<DocId>,
    started: bool,
    /// Every value in the slot is within the bounds.
    covers_slot: bool,
}

impl ValueRangePostList {
    /// `None` when no document in the slot can match.
    pub fn new(
        generation: &Generation,
        slot: crate::ValueNo,
        lower: Option<Vec<u8>>,
        upper: Option<Vec<u8>>,
    ) -> Option<Self> {
        let stream = generation.value_stream(slot)?;
        let stats = generation.value_stats(slot);
        if lower.as_ref().is_some_and(|lo| *lo > stats.upper_bound)
            || upper.as_ref().is_some_and(|hi| *hi < stats.lower_bound)
        {
            return None;
        }
        let covers_slot = lower.as_ref().is_none_or(|lo| *lo <= stats.lower_bound)
            && upper.as_ref().is_none_or(|hi| *hi >= stats.upper_bound);
        Some(ValueRangePostList {
            stream,
            lower,
            upper,
            current: None,
            started: false,
            covers_slot,
        })
    }

    fn accepts(&self, value: &[u8]) -> bool {
        self.lower.as_deref().is_none_or(|lo| value >= lo)
            && self.upper.as_deref().is_none_or(|hi| value <= hi)
    }

    fn scan(&mut self, from: Bound<DocId>) {
        self.started = true;
        let found = self
            .stream
            .range((from, Bound::Unbounded))
            .find(|(_, value)| self.covers_slot || self.accepts(value))
            .map(|(docid, _)| *docid);
        self.current = found;
    }
}

impl PostList for ValueRangePostList {
    fn termfreq_min(&self) -> DocCount {
        if self.covers_slot {
            self.stream.len() as DocCount
        } else {
            0
        }
    }

    fn termfreq_est(&self) -> DocCount {
        if self.covers_slot {
            self.stream.len() as DocCount
        } else {
            (self.stream.len() / 2) as DocCount
        }
    }

    fn termfreq_max(&self) -> DocCount {
        self.stream.len() as DocCount
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn docid(&self) -> DocId {
        self.current.unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        self.started && self.current.is_none()
    }

    fn next(&mut self) -> Result<()> {
        if self.at_end() {
            return Ok(());
        }
        let from = match self.current {
            Some(docid) => Bound::Excluded(docid),
            None => Bound::Unbounded,
        };
        self.scan(from);
        Ok(())
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.at_end() || self.current.is_some_and(|current| current >= docid) {
            return Ok(());
        }
        self.scan(Bound::Included(docid));
        Ok(())
    }

    fn weight(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn count_matching_subqs(&self) -> usize {
        0
    }
}

// ── Posting source ────────────────────────────────────────────────────

/// Adapts a user [`PostingSource`]. A zero factor makes it unweighted.
pub(crate) struct SourcePostList {
    source: Box<dyn PostingSource>,
    factor: f64,
}

impl SourcePostList {
    pub fn new(source: Box<dyn PostingSource>, factor: f64) -> Self {
        SourcePostList { source, factor }
    }
}

impl PostList for SourcePostList {
    fn termfreq_min(&self) -> DocCount {
        self.source.termfreq_min()
    }

    fn termfreq_est(&self) -> DocCount {
        self.source.termfreq_est()
    }

    fn termfreq_max(&self) -> DocCount {
        self.source.termfreq_max()
    }

    fn max_weight(&self) -> f64 {
        self.source.max_weight() * self.factor
    }

    fn docid(&self) -> DocId {
        self.source.docid()
    }

    fn at_end(&self) -> bool {
        self.source.at_end()
    }

    fn next(&mut self) -> Result<()> {
        self.source.next(0.0)
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.source.at_end() {
            return Ok(());
        }
        self.source.skip_to(docid, 0.0)
    }

    fn weight(&self) -> Result<f64> {
        if self.factor == 0.0 {
            return Ok(0.0);
        }
        Ok(self.source.weight()? * self.factor)
    }

    fn count_matching_subqs(&self) -> usize {
        usize::from(self.factor != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use uuid::Uuid;

    fn generation() -> Arc<Generation> {
        let mut generation = Generation::new(Uuid::new_v4());
        for (docid, value) in [(1, "b"), (3, "d"), (4, "a"), (7, "c")] {
            let mut doc = Document::new();
            doc.add_term("x", 1).unwrap();
            doc.add_value(0, value);
            generation.put_document(docid, Arc::clone(doc.content()));
        }
        Arc::new(generation)
    }

    fn drain(list: &mut dyn PostList) -> Vec<DocId> {
        let mut out = Vec::new();
        list.next().unwrap();
        while !list.at_end() {
            out.push(list.docid());
            list.next().unwrap();
        }
        out
    }

    #[test]
    fn test_term_skip_to() {
        let generation = generation();
        let list = generation.postlist(b"x").unwrap();
        let mut pl = TermPostList::new(Arc::clone(&generation), b"x".to_vec(), list, None);
        assert!(!pl.at_end());
        pl.skip_to(2).unwrap();
        assert_eq!(pl.docid(), 3);
        pl.skip_to(1).unwrap();
        assert_eq!(pl.docid(), 3);
        pl.next().unwrap();
        assert_eq!(pl.docid(), 4);
        pl.skip_to(8).unwrap();
        assert!(pl.at_end());
        assert_eq!(pl.count_matching_subqs(), 0);
    }

    #[test]
    fn test_value_range() {
        let generation = generation();
        let mut range =
            ValueRangePostList::new(&generation, 0, Some(b"b".to_vec()), Some(b"c".to_vec())).unwrap();
        assert_eq!(drain(&mut range), vec![1, 7]);

        let mut all = ValueRangePostList::new(&generation, 0, Some(b"a".to_vec()), None).unwrap();
        assert_eq!(all.termfreq_min(), 4);
        assert_eq!(drain(&mut all), vec![1, 3, 4, 7]);

        assert!(ValueRangePostList::new(&generation, 0, Some(b"e".to_vec()), None).is_none());
        assert!(ValueRangePostList::new(&generation, 1, None, None).is_none());
    }
}
