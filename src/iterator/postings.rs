use std::sync::Arc;

use crate::error::Result;
use crate::iterator::{IterState, MoveTicket, MoveTracker, PositionIterator};
use crate::storage::{Generation, PostingList};
use crate::{DocCount, DocId, TermCount};

/// One posting of a term.
#[derive(Debug, Clone)]
pub struct PostingItem {
    docid: DocId,
    wdf: TermCount,
    doclength: u64,
    term: Arc<[u8]>,
    generation: Arc<Generation>,
    ticket: MoveTicket,
}

impl PostingItem {
    pub fn docid(&self) -> DocId {
        self.docid
    }

    pub fn wdf(&self) -> TermCount {
        self.wdf
    }

    pub fn doclength(&self) -> u64 {
        self.doclength
    }

    /// Positions of the term in this document. Lazy.
    pub fn positions(&self) -> Result<PositionIterator> {
        self.ticket.check()?;
        let entry = self.generation.doc(self.docid)?;
        let positions = entry
            .content
            .terms
            .get(self.term.as_ref())
            .map(|t| t.positions.clone())
            .unwrap_or_default();
        Ok(PositionIterator::new(positions))
    }
}

/// Documents indexed by a term, in ascending docid order.
#[derive(Debug, Clone)]
pub struct PostingIterator {
    list: Option<Arc<PostingList>>,
    term: Arc<[u8]>,
    generation: Arc<Generation>,
    next: usize,
    state: IterState,
    tracker: MoveTracker,
}

impl PostingIterator {
    pub(crate) fn new(generation: Arc<Generation>, term: &[u8]) -> Self {
        PostingIterator {
            list: generation.postlist(term),
            term: Arc::from(term),
            generation,
            next: 0,
            state: IterState::Fresh,
            tracker: MoveTracker::default(),
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Number of documents in the list.
    pub fn termfreq(&self) -> DocCount {
        self.list.as_ref().map_or(0, |list| list.termfreq())
    }

    /// Advance to the first posting with docid `>= target`.
    pub fn skip_to(&mut self, target: DocId) -> Option<PostingItem> {
        let list = Arc::clone(self.list.as_ref()?);
        match self.state {
            IterState::Exhausted => return None,
            IterState::Advanced => {
                let current = list.entries[self.next - 1];
                if current.docid >= target {
                    return Some(self.item(current.docid, current.wdf));
                }
            }
            IterState::Fresh => {}
        }
        let idx = self.next + list.entries[self.next..].partition_point(|e| e.docid < target);
        self.land(&list, idx)
    }

    fn land(&mut self, list: &PostingList, idx: usize) -> Option<PostingItem> {
        self.tracker.bump();
        match list.entries.get(idx) {
            Some(entry) => {
                self.next = idx + 1;
                self.state = IterState::Advanced;
                Some(self.item(entry.docid, entry.wdf))
            }
            None => {
                self.next = list.entries.len();
                self.state = IterState::Exhausted;
                None
            }
        }
    }

    fn item(&self, docid: DocId, wdf: TermCount) -> PostingItem {
        PostingItem {
            docid,
            wdf,
            doclength: self.generation.doclength(docid).unwrap_or(0),
            term: Arc::clone(&self.term),
            generation: Arc::clone(&self.generation),
            ticket: self.tracker.ticket(),
        }
    }
}

impl Iterator for PostingIterator {
    type Item = PostingItem;

    fn next(&mut self) -> Option<PostingItem> {
        if self.state == IterState::Exhausted {
            return None;
        }
        let Some(list) = self.list.clone() else {
            self.state = IterState::Exhausted;
            return None;
        };
        self.land(&list, self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use uuid::Uuid;

    fn generation() -> Arc<Generation> {
        let mut generation = Generation::new(Uuid::new_v4());
        for (docid, text) in [(1, "a b"), (2, "b"), (4, "a a c")] {
            let mut doc = Document::new();
            for (pos, word) in text.split(' ').enumerate() {
                doc.add_posting(word, pos as u32 + 1, 1).unwrap();
            }
            generation.put_document(docid, Arc::clone(doc.content()));
        }
        Arc::new(generation)
    }

    #[test]
    fn test_walk_postings() {
        let postings: Vec<(DocId, TermCount, u64)> = PostingIterator::new(generation(), b"a")
            .map(|p| (p.docid(), p.wdf(), p.doclength()))
            .collect();
        assert_eq!(postings, vec![(1, 1, 2), (4, 2, 3)]);
    }

    #[test]
    fn test_skip_to_and_stale_positions() {
        let mut iter = PostingIterator::new(generation(), b"b");
        let first = iter.skip_to(2).unwrap();
        assert_eq!(first.docid(), 2);
        assert_eq!(iter.skip_to(1).unwrap().docid(), 2);
        assert_eq!(first.positions().unwrap().collect::<Vec<_>>(), vec![1]);
        assert!(iter.next().is_none());
        assert!(first.positions().is_err());
        assert_eq!(iter.state(), IterState::Exhausted);
    }

    #[test]
    fn test_missing_term() {
        let mut iter = PostingIterator::new(generation(), b"zzz");
        assert_eq!(iter.termfreq(), 0);
        assert!(iter.next().is_none());
    }
}
