use std::fmt;
use std::sync::Arc;

use crate::document::DocumentContent;
use crate::error::{QuarryError, Result};
use crate::iterator::{IterState, MoveTicket, MoveTracker, PositionIterator};
use crate::storage::Generation;
use crate::{DocCount, TermCount};

/// What a term iterator walks, which decides the properties its items have.
pub(crate) enum TermSource {
    /// Terms of one document: wdf eager, termfreq and positions lazy.
    Document {
        content: Arc<DocumentContent>,
        generation: Option<Arc<Generation>>,
    },
    /// Every term in a database: termfreq lazy.
    Database { generation: Arc<Generation> },
    /// Terms carrying a frequency, such as the spelling dictionary.
    Frequencies,
    /// Bare term names.
    Plain,
}

impl fmt::Debug for TermSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TermSource::Document { .. } => "Document",
            TermSource::Database { .. } => "Database",
            TermSource::Frequencies => "Frequencies",
            TermSource::Plain => "Plain",
        };
        f.write_str(kind)
    }
}

/// A term returned by a [`TermIterator`].
#[derive(Debug, Clone)]
pub struct TermItem {
    term: Vec<u8>,
    eager: u64,
    source: Arc<TermSource>,
    ticket: MoveTicket,
}

impl TermItem {
    pub fn term(&self) -> &[u8] {
        &self.term
    }

    pub fn into_term(self) -> Vec<u8> {
        self.term
    }

    /// Within-document frequency. Only document termlists have one.
    pub fn wdf(&self) -> Result<TermCount> {
        match self.source.as_ref() {
            TermSource::Document { .. } => Ok(self.eager as TermCount),
            _ => Err(QuarryError::invalid_operation("Iterator does not support wdfs")),
        }
    }

    /// Number of documents indexed by the term.
    pub fn termfreq(&self) -> Result<DocCount> {
        match self.source.as_ref() {
            TermSource::Document {
                generation: Some(generation),
                ..
            }
            | TermSource::Database { generation } => {
                self.ticket.check()?;
                Ok(generation.termfreq(&self.term))
            }
            TermSource::Document {
                generation: None, ..
            } => Err(QuarryError::invalid_operation(
                "Can't get term frequency from a document termlist which is not associated with a database.",
            )),
            TermSource::Frequencies => Ok(self.eager),
            TermSource::Plain => Err(QuarryError::invalid_operation(
                "Iterator does not support term frequencies",
            )),
        }
    }

    /// Positions of the term in the document. Only document termlists have
    /// them.
    pub fn positions(&self) -> Result<PositionIterator> {
        match self.source.as_ref() {
            TermSource::Document { content, .. } => {
                self.ticket.check()?;
                let positions = content
                    .terms
                    .get(&self.term)
                    .map(|entry| entry.positions.clone())
                    .unwrap_or_default();
                Ok(PositionIterator::new(positions))
            }
            _ => Err(QuarryError::invalid_operation(
                "Iterator does not support position lists",
            )),
        }
    }

    pub fn positions_len(&self) -> Result<usize> {
        self.positions().map(|iter| iter.len())
    }
}

/// Terms in ascending byte order.
#[derive(Debug, Clone)]
pub struct TermIterator {
    rows: Arc<Vec<(Vec<u8>, u64)>>,
    source: Arc<TermSource>,
    next: usize,
    state: IterState,
    tracker: MoveTracker,
}

impl TermIterator {
    fn from_rows(rows: Vec<(Vec<u8>, u64)>, source: TermSource) -> Self {
        TermIterator {
            rows: Arc::new(rows),
            source: Arc::new(source),
            next: 0,
            state: IterState::Fresh,
            tracker: MoveTracker::default(),
        }
    }

    pub(crate) fn for_document(
        content: Arc<DocumentContent>,
        generation: Option<Arc<Generation>>,
    ) -> Self {
        let rows = content
            .terms
            .iter()
            .map(|(term, entry)| (term.clone(), u64::from(entry.wdf)))
            .collect();
        Self::from_rows(rows, TermSource::Document { content, generation })
    }

    pub(crate) fn all_terms(generation: Arc<Generation>, prefix: &[u8]) -> Self {
        let rows = generation
            .terms_with_prefix(prefix)
            .map(|(term, _)| (term.clone(), 0))
            .collect();
        Self::from_rows(rows, TermSource::Database { generation })
    }

    pub(crate) fn with_frequencies(rows: Vec<(Vec<u8>, u64)>) -> Self {
        Self::from_rows(rows, TermSource::Frequencies)
    }

    pub(crate) fn plain(terms: Vec<Vec<u8>>) -> Self {
        let rows = terms.into_iter().map(|term| (term, 0)).collect();
        Self::from_rows(rows, TermSource::Plain)
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Number of terms, independent of iteration progress.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Advance to the first term `>= target`.
    pub fn skip_to<T: AsRef<[u8]>>(&mut self, target: T) -> Option<TermItem> {
        let target = target.as_ref();
        match self.state {
            IterState::Exhausted => return None,
            IterState::Advanced => {
                if self.rows[self.next - 1].0.as_slice() >= target {
                    return Some(self.item(self.next - 1));
                }
            }
            IterState::Fresh => {}
        }
        let idx =
            self.next + self.rows[self.next..].partition_point(|(term, _)| term.as_slice() < target);
        self.land(idx)
    }

    fn land(&mut self, idx: usize) -> Option<TermItem> {
        self.tracker.bump();
        if idx < self.rows.len() {
            self.next = idx + 1;
            self.state = IterState::Advanced;
            Some(self.item(idx))
        } else {
            self.next = self.rows.len();
            self.state = IterState::Exhausted;
            None
        }
    }

    fn item(&self, idx: usize) -> TermItem {
        let (term, eager) = &self.rows[idx];
        TermItem {
            term: term.clone(),
            eager: *eager,
            source: Arc::clone(&self.source),
            ticket: self.tracker.ticket(),
        }
    }
}

impl Iterator for TermIterator {
    type Item = TermItem;

    fn next(&mut self) -> Option<TermItem> {
        if self.state == IterState::Exhausted {
            return None;
        }
        self.land(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn document() -> Document {
        let mut doc = Document::new();
        doc.add_posting("it", 1, 1).unwrap();
        doc.add_posting("was", 2, 1).unwrap();
        doc.add_posting("two", 3, 2).unwrap();
        doc
    }

    #[test]
    fn test_document_termlist_without_database() {
        let mut iter = document().termlist();
        let item = iter.next().unwrap();
        assert_eq!(item.term(), b"it");
        assert_eq!(item.wdf().unwrap(), 1);
        assert_eq!(item.positions().unwrap().collect::<Vec<_>>(), vec![1]);
        assert!(matches!(item.termfreq(), Err(QuarryError::InvalidOperation(_))));
    }

    #[test]
    fn test_lazy_positions_expire() {
        let mut iter = document().termlist();
        let first = iter.next().unwrap();
        let second = iter.next().unwrap();
        assert_eq!(second.term(), b"two");
        assert_eq!(second.wdf().unwrap(), 2);
        assert_eq!(first.wdf().unwrap(), 1);
        let err = first.positions().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid operation: Iterator has moved, and does not support random access"
        );
    }

    #[test]
    fn test_skip_to() {
        let mut iter = document().termlist();
        assert_eq!(iter.skip_to("t").unwrap().term(), b"two");
        assert_eq!(iter.skip_to("a").unwrap().term(), b"two");
        assert!(iter.skip_to("x").is_none());
        assert_eq!(iter.state(), IterState::Exhausted);
    }

    #[test]
    fn test_plain_capabilities() {
        let mut iter = TermIterator::plain(vec![b"a".to_vec()]);
        let item = iter.next().unwrap();
        assert!(item.wdf().is_err());
        assert!(item.termfreq().is_err());
        assert!(item.positions().is_err());
    }

    #[test]
    fn test_frequencies_are_eager() {
        let mut iter = TermIterator::with_frequencies(vec![(b"hello".to_vec(), 3)]);
        let item = iter.next().unwrap();
        assert!(iter.next().is_none());
        assert_eq!(item.termfreq().unwrap(), 3);
    }
}
