//! Postlists combining other postlists.

use std::sync::Arc;

use crate::error::Result;
use crate::matcher::positional::Positional;
use crate::matcher::{PostList, and_estimate, or_estimate};
use crate::storage::Generation;
use crate::weight::Weight;
use crate::{DocCount, DocId, TermCount, TermPos};

type Sub = Box<dyn PostList>;

// ── AND ───────────────────────────────────────────────────────────────

/// Documents matching every subquery, optionally with a position check.
pub(crate) struct AndPostList {
    subs: Vec<Sub>,
    did: DocId,
    ended: bool,
    dbsize: DocCount,
    positional: Option<Positional>,
}

impl AndPostList {
    pub fn new(subs: Vec<Sub>, dbsize: DocCount, positional: Option<Positional>) -> Self {
        let ended = subs.is_empty();
        AndPostList {
            subs,
            did: 0,
            ended,
            dbsize,
            positional,
        }
    }

    /// Leapfrog until every sub sits on the same document, then apply the
    /// position check, moving on if it fails.
    fn align(&mut self) -> Result<()> {
        loop {
            if self.subs[0].at_end() {
                self.ended = true;
                return Ok(());
            }
            let mut target = self.subs[0].docid();
            let mut idx = 1;
            while idx < self.subs.len() {
                let sub = &mut self.subs[idx];
                sub.skip_to(target)?;
                if sub.at_end() {
                    self.ended = true;
                    return Ok(());
                }
                if sub.docid() > target {
                    target = sub.docid();
                    self.subs[0].skip_to(target)?;
                    if self.subs[0].at_end() {
                        self.ended = true;
                        return Ok(());
                    }
                    target = self.subs[0].docid();
                    idx = 1;
                    continue;
                }
                idx += 1;
            }
            self.did = target;
            if self.positions_match()? {
                return Ok(());
            }
            self.subs[0].next()?;
        }
    }

    fn positions_match(&self) -> Result<bool> {
        let Some(positional) = self.positional else {
            return Ok(true);
        };
        let lists = self
            .subs
            .iter()
            .map(|sub| sub.positions())
            .collect::<Result<Vec<_>>>()?;
        Ok(positional.matches(&lists))
    }
}

impl PostList for AndPostList {
    fn termfreq_min(&self) -> DocCount {
        if self.positional.is_some() {
            return 0;
        }
        // Pigeonhole: documents missed by some sub are at most the sum of
        // their complements.
        let missed: DocCount = self
            .subs
            .iter()
            .map(|sub| self.dbsize.saturating_sub(sub.termfreq_min()))
            .sum();
        self.dbsize.saturating_sub(missed)
    }

    fn termfreq_est(&self) -> DocCount {
        let est = and_estimate(self.subs.iter().map(|sub| sub.termfreq_est()), self.dbsize);
        if self.positional.is_some() { est / 2 } else { est }
    }

    fn termfreq_max(&self) -> DocCount {
        self.subs.iter().map(|sub| sub.termfreq_max()).min().unwrap_or(0)
    }

    fn max_weight(&self) -> f64 {
        self.subs.iter().map(|sub| sub.max_weight()).sum()
    }

    fn docid(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.ended
    }

    fn next(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.subs[0].next()?;
        self.align()
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.ended || (self.did != 0 && docid <= self.did) {
            return Ok(());
        }
        self.subs[0].skip_to(docid)?;
        self.align()
    }

    fn weight(&self) -> Result<f64> {
        let mut total = 0.0;
        for sub in &self.subs {
            total += sub.weight()?;
        }
        Ok(total)
    }

    fn count_matching_subqs(&self) -> usize {
        self.subs.iter().map(|sub| sub.count_matching_subqs()).sum()
    }

    fn wdf(&self) -> TermCount {
        self.subs.iter().map(|sub| sub.wdf()).sum()
    }
}

// ── OR / MAX ──────────────────────────────────────────────────────────

/// How an [`OrPostList`] combines the weights of matching subs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combine {
    Sum,
    Max,
}

/// Documents matching any subquery.
pub(crate) struct OrPostList {
    subs: Vec<Sub>,
    did: DocId,
    started: bool,
    ended: bool,
    dbsize: DocCount,
    combine: Combine,
}

impl OrPostList {
    pub fn new(subs: Vec<Sub>, dbsize: DocCount, combine: Combine) -> Self {
        let ended = subs.is_empty();
        OrPostList {
            subs,
            did: 0,
            started: false,
            ended,
            dbsize,
            combine,
        }
    }

    fn settle(&mut self) {
        self.started = true;
        match self.subs.iter().filter(|sub| !sub.at_end()).map(|sub| sub.docid()).min() {
            Some(did) => self.did = did,
            None => self.ended = true,
        }
    }

    fn matching(&self) -> impl Iterator<Item = &Sub> {
        let did = self.did;
        self.subs
            .iter()
            .filter(move |sub| !sub.at_end() && sub.docid() == did)
    }
}

impl PostList for OrPostList {
    fn termfreq_min(&self) -> DocCount {
        self.subs.iter().map(|sub| sub.termfreq_min()).max().unwrap_or(0)
    }

    fn termfreq_est(&self) -> DocCount {
        or_estimate(self.subs.iter().map(|sub| sub.termfreq_est()), self.dbsize)
    }

    fn termfreq_max(&self) -> DocCount {
        let sum: DocCount = self.subs.iter().map(|sub| sub.termfreq_max()).sum();
        sum.min(self.dbsize)
    }

    fn max_weight(&self) -> f64 {
        let bounds = self.subs.iter().map(|sub| sub.max_weight());
        match self.combine {
            Combine::Sum => bounds.sum(),
            Combine::Max => bounds.fold(0.0, f64::max),
        }
    }

    fn docid(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.ended
    }

    fn next(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        let did = self.did;
        let started = self.started;
        for sub in &mut self.subs {
            if !started || (!sub.at_end() && sub.docid() == did) {
                sub.next()?;
            }
        }
        self.settle();
        Ok(())
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        if self.ended || (self.started && docid <= self.did) {
            return Ok(());
        }
        for sub in &mut self.subs {
            if !sub.at_end() {
                sub.skip_to(docid)?;
            }
        }
        self.settle();
        Ok(())
    }

    fn weight(&self) -> Result<f64> {
        let mut total = 0.0f64;
        for sub in self.matching() {
            let weight = sub.weight()?;
            total = match self.combine {
                Combine::Sum => total + weight,
                Combine::Max => total.max(weight),
            };
        }
        Ok(total)
    }

    fn count_matching_subqs(&self) -> usize {
        self.matching().map(|sub| sub.count_matching_subqs()).sum()
    }

    fn wdf(&self) -> TermCount {
        self.matching().map(|sub| sub.wdf()).sum()
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        let mut merged = Vec::new();
        for sub in self.matching() {
            merged.extend(sub.positions()?);
        }
        merged.sort_unstable();
        merged.dedup();
        Ok(merged)
    }
}

// ── XOR ───────────────────────────────────────────────────────────────

/// Documents matching an odd number of subqueries.
pub(crate) struct XorPostList {
    inner: OrPostList,
}

impl XorPostList {
    pub fn new(subs: Vec<Sub>, dbsize: DocCount) -> Self {
        XorPostList {
            inner: OrPostList::new(subs, dbsize, Combine::Sum),
        }
    }

    fn skip_even(&mut self) -> Result<()> {
        while !self.inner.at_end() && self.inner.matching().count() % 2 == 0 {
            self.inner.next()?;
        }
        Ok(())
    }
}

impl PostList for XorPostList {
    fn termfreq_min(&self) -> DocCount {
        0
    }

    fn termfreq_est(&self) -> DocCount {
        let dbsize = self.inner.dbsize;
        if dbsize == 0 {
            return 0;
        }
        // P(odd) = (1 - Π(1 - 2p)) / 2
        let n = dbsize as f64;
        let product: f64 = self
            .inner
            .subs
            .iter()
            .map(|sub| 1.0 - 2.0 * (sub.termfreq_est() as f64 / n).min(1.0))
            .product();
        ((1.0 - product) / 2.0 * n + 0.5) as DocCount
    }

    fn termfreq_max(&self) -> DocCount {
        self.inner.termfreq_max()
    }

    fn max_weight(&self) -> f64 {
        self.inner.max_weight()
    }

    fn docid(&self) -> DocId {
        self.inner.docid()
    }

    fn at_end(&self) -> bool {
        self.inner.at_end()
    }

    fn next(&mut self) -> Result<()> {
        self.inner.next()?;
        self.skip_even()
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        self.inner.skip_to(docid)?;
        self.skip_even()
    }

    fn weight(&self) -> Result<f64> {
        self.inner.weight()
    }

    fn count_matching_subqs(&self) -> usize {
        self.inner.count_matching_subqs()
    }

    fn wdf(&self) -> TermCount {
        self.inner.wdf()
    }
}

// ── AND_NOT ───────────────────────────────────────────────────────────

/// Documents matching `left` but not `right`. Weight comes from `left`.
pub(crate) struct AndNotPostList {
    left: Sub,
    right: Sub,
    dbsize: DocCount,
}

impl AndNotPostList {
    pub fn new(left: Sub, right: Sub, dbsize: DocCount) -> Self {
        AndNotPostList { left, right, dbsize }
    }

    fn skip_excluded(&mut self) -> Result<()> {
        while !self.left.at_end() {
            let did = self.left.docid();
            self.right.skip_to(did)?;
            if self.right.at_end() || self.right.docid() != did {
                break;
            }
            self.left.next()?;
        }
        Ok(())
    }
}

impl PostList for AndNotPostList {
    fn termfreq_min(&self) -> DocCount {
        self.left.termfreq_min().saturating_sub(self.right.termfreq_max())
    }

    fn termfreq_est(&self) -> DocCount {
        if self.dbsize == 0 {
            return 0;
        }
        let excluded = self.right.termfreq_est() as f64 / self.dbsize as f64;
        (self.left.termfreq_est() as f64 * (1.0 - excluded.min(1.0)) + 0.5) as DocCount
    }

    fn termfreq_max(&self) -> DocCount {
        self.left.termfreq_max()
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight()
    }

    fn docid(&self) -> DocId {
        self.left.docid()
    }

    fn at_end(&self) -> bool {
        self.left.at_end()
    }

    fn next(&mut self) -> Result<()> {
        self.left.next()?;
        self.skip_excluded()
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        self.left.skip_to(docid)?;
        self.skip_excluded()
    }

    fn weight(&self) -> Result<f64> {
        self.left.weight()
    }

    fn count_matching_subqs(&self) -> usize {
        self.left.count_matching_subqs()
    }

    fn wdf(&self) -> TermCount {
        self.left.wdf()
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        self.left.positions()
    }
}

// ── AND_MAYBE ─────────────────────────────────────────────────────────

/// Documents matching `left`; `right` only adds weight where it matches.
pub(crate) struct AndMaybePostList {
    left: Sub,
    right: Sub,
}

impl AndMaybePostList {
    pub fn new(left: Sub, right: Sub) -> Self {
        AndMaybePostList { left, right }
    }

    fn sync_right(&mut self) -> Result<()> {
        if !self.left.at_end() && !self.right.at_end() {
            self.right.skip_to(self.left.docid())?;
        }
        Ok(())
    }

    fn right_matches(&self) -> bool {
        !self.right.at_end() && self.right.docid() == self.left.docid()
    }
}

impl PostList for AndMaybePostList {
    fn termfreq_min(&self) -> DocCount {
        self.left.termfreq_min()
    }

    fn termfreq_est(&self) -> DocCount {
        self.left.termfreq_est()
    }

    fn termfreq_max(&self) -> DocCount {
        self.left.termfreq_max()
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight() + self.right.max_weight()
    }

    fn docid(&self) -> DocId {
        self.left.docid()
    }

    fn at_end(&self) -> bool {
        self.left.at_end()
    }

    fn next(&mut self) -> Result<()> {
        self.left.next()?;
        self.sync_right()
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        self.left.skip_to(docid)?;
        self.sync_right()
    }

    fn weight(&self) -> Result<f64> {
        let mut weight = self.left.weight()?;
        if self.right_matches() {
            weight += self.right.weight()?;
        }
        Ok(weight)
    }

    fn count_matching_subqs(&self) -> usize {
        let mut count = self.left.count_matching_subqs();
        if self.right_matches() {
            count += self.right.count_matching_subqs();
        }
        count
    }

    fn wdf(&self) -> TermCount {
        let mut wdf = self.left.wdf();
        if self.right_matches() {
            wdf += self.right.wdf();
        }
        wdf
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        self.left.positions()
    }
}

// ── SYNONYM ───────────────────────────────────────────────────────────

/// An unweighted union weighed as if it were a single term whose wdf is
/// the sum of the wdfs of the matching subs.
pub(crate) struct SynonymPostList {
    inner: OrPostList,
    weight: Option<Box<dyn Weight>>,
    generation: Arc<Generation>,
}

impl SynonymPostList {
    pub fn new(
        inner: OrPostList,
        weight: Option<Box<dyn Weight>>,
        generation: Arc<Generation>,
    ) -> Self {
        SynonymPostList {
            inner,
            weight,
            generation,
        }
    }
}

impl PostList for SynonymPostList {
    fn termfreq_min(&self) -> DocCount {
        self.inner.termfreq_min()
    }

    fn termfreq_est(&self) -> DocCount {
        self.inner.termfreq_est()
    }

    fn termfreq_max(&self) -> DocCount {
        self.inner.termfreq_max()
    }

    fn max_weight(&self) -> f64 {
        self.weight.as_ref().map_or(0.0, |w| w.maxpart())
    }

    fn docid(&self) -> DocId {
        self.inner.docid()
    }

    fn at_end(&self) -> bool {
        self.inner.at_end()
    }

    fn next(&mut self) -> Result<()> {
        self.inner.next()
    }

    fn skip_to(&mut self, docid: DocId) -> Result<()> {
        self.inner.skip_to(docid)
    }

    fn weight(&self) -> Result<f64> {
        let Some(weight) = &self.weight else {
            return Ok(0.0);
        };
        let doclength = self.generation.doclength(self.inner.docid())?;
        Ok(weight.sumpart(self.inner.wdf(), doclength))
    }

    fn count_matching_subqs(&self) -> usize {
        usize::from(self.weight.is_some())
    }

    fn wdf(&self) -> TermCount {
        self.inner.wdf()
    }

    fn positions(&self) -> Result<Vec<TermPos>> {
        self.inner.positions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::matcher::leaf::TermPostList;
    use uuid::Uuid;

    fn generation() -> Arc<Generation> {
        let mut generation = Generation::new(Uuid::new_v4());
        let docs = [(1, "a b"), (2, "b c"), (3, "a c"), (4, "a b c"), (5, "c")];
        for (docid, text) in docs {
            let mut doc = Document::new();
            for (pos, word) in text.split(' ').enumerate() {
                doc.add_posting(word, pos as TermPos + 1, 1).unwrap();
            }
            generation.put_document(docid, Arc::clone(doc.content()));
        }
        Arc::new(generation)
    }

    fn term(generation: &Arc<Generation>, term: &str) -> Sub {
        let list = generation.postlist(term.as_bytes()).unwrap();
        Box::new(TermPostList::new(Arc::clone(generation), term.as_bytes().to_vec(), list, None))
    }

    fn drain(mut list: impl PostList) -> Vec<DocId> {
        let mut out = Vec::new();
        list.next().unwrap();
        while !list.at_end() {
            out.push(list.docid());
            list.next().unwrap();
        }
        out
    }

    #[test]
    fn test_and_or_xor() {
        let g = generation();
        let and = AndPostList::new(vec![term(&g, "a"), term(&g, "b")], 5, None);
        assert_eq!(drain(and), vec![1, 4]);
        let or = OrPostList::new(vec![term(&g, "a"), term(&g, "b")], 5, Combine::Sum);
        assert_eq!(drain(or), vec![1, 2, 3, 4]);
        let xor = XorPostList::new(vec![term(&g, "a"), term(&g, "b"), term(&g, "c")], 5);
        assert_eq!(drain(xor), vec![4, 5]);
    }

    #[test]
    fn test_and_not_and_maybe() {
        let g = generation();
        let and_not = AndNotPostList::new(term(&g, "c"), term(&g, "a"), 5);
        assert_eq!(drain(and_not), vec![2, 5]);
        let and_maybe = AndMaybePostList::new(term(&g, "a"), term(&g, "b"));
        assert_eq!(drain(and_maybe), vec![1, 3, 4]);
    }

    #[test]
    fn test_phrase_filter() {
        let g = generation();
        let phrase = AndPostList::new(
            vec![term(&g, "b"), term(&g, "c")],
            5,
            Some(Positional::Phrase(2)),
        );
        assert_eq!(drain(phrase), vec![2, 4]);
        let reversed = AndPostList::new(
            vec![term(&g, "c"), term(&g, "a")],
            5,
            Some(Positional::Phrase(2)),
        );
        assert!(drain(reversed).is_empty());
    }

    #[test]
    fn test_skip_to_on_or() {
        let g = generation();
        let mut or = OrPostList::new(vec![term(&g, "a"), term(&g, "b")], 5, Combine::Sum);
        or.skip_to(3).unwrap();
        assert_eq!(or.docid(), 3);
        or.next().unwrap();
        assert_eq!(or.docid(), 4);
        or.next().unwrap();
        assert!(or.at_end());
    }
}
