//! In-memory index generations and their on-disk persistence.
//!
//! A [`Generation`] is an immutable, fully indexed view of a database at one
//! revision. Readers hold an `Arc<Generation>` and never observe later
//! changes. The writer mutates a private copy (`Arc::make_mut`), and posting
//! lists and value streams are themselves `Arc`-shared so only the lists that
//! a change touches get cloned.
//!
//! ```text
//! database directory
//! ├── quarry.json              manifest: format, uuid, revision, snapshot
//! └── snapshot-00000003.qdb    checksummed snapshot of revision 3
//! ```

pub(crate) mod disk;
pub(crate) mod manifest;
pub(crate) mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use uuid::Uuid;

use crate::document::DocumentContent;
use crate::error::{QuarryError, Result};
use crate::{DocCount, DocId, TermCount, ValueNo};

pub(crate) use disk::{DiskStore, OpenMode};

/// A stored document together with its cached length.
#[derive(Debug, Clone)]
pub(crate) struct DocEntry {
    pub content: Arc<DocumentContent>,
    pub length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PostingEntry {
    pub docid: DocId,
    pub wdf: TermCount,
}

/// Postings for one term in ascending docid order.
#[derive(Debug, Clone, Default)]
pub(crate) struct PostingList {
    pub entries: Vec<PostingEntry>,
    pub collection_freq: u64,
    pub wdf_upper: TermCount,
}

impl PostingList {
    pub fn from_entries(entries: Vec<PostingEntry>) -> Self {
        let collection_freq = entries.iter().map(|e| u64::from(e.wdf)).sum();
        let wdf_upper = entries.iter().map(|e| e.wdf).max().unwrap_or(0);
        PostingList {
            entries,
            collection_freq,
            wdf_upper,
        }
    }

    pub fn termfreq(&self) -> DocCount {
        self.entries.len() as DocCount
    }

    fn insert(&mut self, docid: DocId, wdf: TermCount) {
        let entry = PostingEntry { docid, wdf };
        match self.entries.binary_search_by_key(&docid, |e| e.docid) {
            Ok(idx) => {
                self.collection_freq -= u64::from(self.entries[idx].wdf);
                self.entries[idx] = entry;
            }
            Err(idx) => self.entries.insert(idx, entry),
        }
        self.collection_freq += u64::from(wdf);
        self.wdf_upper = self.wdf_upper.max(wdf);
    }

    fn remove(&mut self, docid: DocId) {
        if let Ok(idx) = self.entries.binary_search_by_key(&docid, |e| e.docid) {
            let removed = self.entries.remove(idx);
            self.collection_freq -= u64::from(removed.wdf);
        }
    }
}

/// Values of one slot, keyed by docid.
pub(crate) type ValueStream = BTreeMap<DocId, Vec<u8>>;

/// Frequency and bounds of a value slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueStats {
    pub freq: DocCount,
    pub lower_bound: Vec<u8>,
    pub upper_bound: Vec<u8>,
}

/// One revision of a database.
#[derive(Debug, Clone)]
pub(crate) struct Generation {
    pub revision: u64,
    pub uuid: Uuid,
    pub last_docid: DocId,
    pub total_length: u64,
    /// Loose after deletions; exact after a reload.
    pub doclen_lower: u64,
    pub doclen_upper: u64,
    pub wdf_upper: TermCount,
    /// Number of (document, term) pairs carrying positions.
    pub positional_pairs: u64,
    pub docs: BTreeMap<DocId, DocEntry>,
    pub postings: BTreeMap<Vec<u8>, Arc<PostingList>>,
    pub values: BTreeMap<ValueNo, Arc<ValueStream>>,
    pub metadata: BTreeMap<Vec<u8>, Vec<u8>>,
    pub synonyms: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>,
    pub spellings: BTreeMap<Vec<u8>, u32>,
}

impl Generation {
    pub fn new(uuid: Uuid) -> Self {
        Generation {
            revision: 0,
            uuid,
            last_docid: 0,
            total_length: 0,
            doclen_lower: 0,
            doclen_upper: 0,
            wdf_upper: 0,
            positional_pairs: 0,
            docs: BTreeMap::new(),
            postings: BTreeMap::new(),
            values: BTreeMap::new(),
            metadata: BTreeMap::new(),
            synonyms: BTreeMap::new(),
            spellings: BTreeMap::new(),
        }
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub fn doc_count(&self) -> DocCount {
        self.docs.len() as DocCount
    }

    pub fn avlength(&self) -> f64 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.docs.len() as f64
        }
    }

    pub fn termfreq(&self, term: &[u8]) -> DocCount {
        if term.is_empty() {
            return self.doc_count();
        }
        self.postings.get(term).map_or(0, |list| list.termfreq())
    }

    pub fn collection_freq(&self, term: &[u8]) -> u64 {
        if term.is_empty() {
            return self.total_length;
        }
        self.postings.get(term).map_or(0, |list| list.collection_freq)
    }

    pub fn term_exists(&self, term: &[u8]) -> bool {
        if term.is_empty() {
            return !self.docs.is_empty();
        }
        self.postings.contains_key(term)
    }

    pub fn has_positions(&self) -> bool {
        self.positional_pairs > 0
    }

    pub fn value_stats(&self, slot: ValueNo) -> ValueStats {
        match self.values.get(&slot) {
            Some(stream) if !stream.is_empty() => {
                let mut lower: Option<&Vec<u8>> = None;
                let mut upper: Option<&Vec<u8>> = None;
                for value in stream.values() {
                    if lower.is_none_or(|l| value < l) {
                        lower = Some(value);
                    }
                    if upper.is_none_or(|u| value > u) {
                        upper = Some(value);
                    }
                }
                ValueStats {
                    freq: stream.len() as DocCount,
                    lower_bound: lower.cloned().unwrap_or_default(),
                    upper_bound: upper.cloned().unwrap_or_default(),
                }
            }
            _ => ValueStats::default(),
        }
    }

    // ── Lookups ─────────────────────────────────────────────────────

    pub fn doc(&self, docid: DocId) -> Result<&DocEntry> {
        self.docs.get(&docid).ok_or(QuarryError::DocNotFound(docid))
    }

    pub fn doclength(&self, docid: DocId) -> Result<u64> {
        self.doc(docid).map(|entry| entry.length)
    }

    /// Posting list for `term`. The empty term lists every document with
    /// wdf 1.
    pub fn postlist(&self, term: &[u8]) -> Option<Arc<PostingList>> {
        if term.is_empty() {
            if self.docs.is_empty() {
                return None;
            }
            let entries = self
                .docs
                .keys()
                .map(|&docid| PostingEntry { docid, wdf: 1 })
                .collect();
            return Some(Arc::new(PostingList::from_entries(entries)));
        }
        self.postings.get(term).cloned()
    }

    pub fn value_stream(&self, slot: ValueNo) -> Option<Arc<ValueStream>> {
        self.values.get(&slot).cloned()
    }

    pub fn value(&self, docid: DocId, slot: ValueNo) -> Option<&[u8]> {
        self.values
            .get(&slot)
            .and_then(|stream| stream.get(&docid))
            .map(Vec::as_slice)
    }

    /// Terms starting with `prefix`, in ascending order.
    pub fn terms_with_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Arc<PostingList>)> + 'a {
        self.postings
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
    }

    // ── Mutation (writer copies only) ───────────────────────────────

    /// Index `content` under `docid`, replacing any existing document.
    pub fn put_document(&mut self, docid: DocId, content: Arc<DocumentContent>) {
        if self.docs.contains_key(&docid) {
            self.remove_document(docid);
        }

        let length = content.length();
        for (term, entry) in &content.terms {
            let list = self.postings.entry(term.clone()).or_default();
            Arc::make_mut(list).insert(docid, entry.wdf);
            self.wdf_upper = self.wdf_upper.max(entry.wdf);
            if !entry.positions.is_empty() {
                self.positional_pairs += 1;
            }
        }
        for (slot, value) in &content.values {
            let stream = self.values.entry(*slot).or_default();
            Arc::make_mut(stream).insert(docid, value.clone());
        }

        if self.docs.is_empty() {
            self.doclen_lower = length;
            self.doclen_upper = length;
        } else {
            self.doclen_lower = self.doclen_lower.min(length);
            self.doclen_upper = self.doclen_upper.max(length);
        }
        self.total_length += length;
        self.last_docid = self.last_docid.max(docid);
        self.docs.insert(docid, DocEntry { content, length });
    }

    /// Remove `docid` from every structure. Returns false if it was absent.
    pub fn remove_document(&mut self, docid: DocId) -> bool {
        let Some(entry) = self.docs.remove(&docid) else {
            return false;
        };
        for (term, term_entry) in &entry.content.terms {
            let now_empty = match self.postings.get_mut(term.as_slice()) {
                Some(list) => {
                    let list = Arc::make_mut(list);
                    list.remove(docid);
                    list.entries.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(term.as_slice());
            }
            if !term_entry.positions.is_empty() {
                self.positional_pairs = self.positional_pairs.saturating_sub(1);
            }
        }
        for slot in entry.content.values.keys() {
            let now_empty = match self.values.get_mut(slot) {
                Some(stream) => {
                    let stream = Arc::make_mut(stream);
                    stream.remove(&docid);
                    stream.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.values.remove(slot);
            }
        }
        self.total_length -= entry.length;
        if self.docs.is_empty() {
            self.doclen_lower = 0;
            self.doclen_upper = 0;
        }
        true
    }

    /// Recompute the derived statistics from the stored documents.
    pub fn rebuild_stats(&mut self) {
        self.total_length = self.docs.values().map(|d| d.length).sum();
        self.doclen_lower = self.docs.values().map(|d| d.length).min().unwrap_or(0);
        self.doclen_upper = self.docs.values().map(|d| d.length).max().unwrap_or(0);
        self.wdf_upper = self
            .postings
            .values()
            .map(|list| list.wdf_upper)
            .max()
            .unwrap_or(0);
        self.positional_pairs = self
            .docs
            .values()
            .flat_map(|d| d.content.terms.values())
            .filter(|entry| !entry.positions.is_empty())
            .count() as u64;
    }

    /// Structural consistency problems, empty when the generation is sound.
    pub fn consistency_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (term, list) in &self.postings {
            let name = crate::util::escape::escape_bytes(term);
            if list.entries.is_empty() {
                errors.push(format!("term '{name}' has an empty posting list"));
            }
            if list.entries.windows(2).any(|w| w[0].docid >= w[1].docid) {
                errors.push(format!("postings for '{name}' are not in docid order"));
            }
            let mut cf = 0u64;
            for posting in &list.entries {
                cf += u64::from(posting.wdf);
                match self.docs.get(&posting.docid) {
                    Some(doc) => match doc.content.terms.get(term) {
                        Some(entry) if entry.wdf == posting.wdf => {}
                        Some(entry) => errors.push(format!(
                            "wdf mismatch for '{name}' in document {}: {} vs {}",
                            posting.docid, posting.wdf, entry.wdf
                        )),
                        None => errors.push(format!(
                            "term '{name}' indexes document {} which lacks it",
                            posting.docid
                        )),
                    },
                    None => errors.push(format!(
                        "term '{name}' indexes missing document {}",
                        posting.docid
                    )),
                }
            }
            if cf != list.collection_freq {
                errors.push(format!("collection frequency mismatch for '{name}'"));
            }
        }
        let mut total = 0u64;
        for (docid, doc) in &self.docs {
            total += doc.length;
            if doc.length != doc.content.length() {
                errors.push(format!("stale length for document {docid}"));
            }
            if *docid > self.last_docid {
                errors.push(format!("document {docid} beyond last docid"));
            }
            for term in doc.content.terms.keys() {
                let indexed = self
                    .postings
                    .get(term)
                    .is_some_and(|list| list.entries.binary_search_by_key(docid, |e| e.docid).is_ok());
                if !indexed {
                    errors.push(format!(
                        "document {docid} term '{}' missing from postings",
                        crate::util::escape::escape_bytes(term)
                    ));
                }
            }
        }
        if total != self.total_length {
            errors.push(format!(
                "total length {} does not match documents ({total})",
                self.total_length
            ));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn content(terms: &[(&str, u32)]) -> Arc<DocumentContent> {
        let mut doc = Document::new();
        for (pos, (term, wdf)) in terms.iter().enumerate() {
            doc.add_posting(term, pos as u32 + 1, *wdf).unwrap();
        }
        doc.add_value(1, format!("v{}", terms.len()));
        Arc::clone(doc.content())
    }

    #[test]
    fn test_put_and_remove() {
        let mut generation = Generation::new(Uuid::new_v4());
        generation.put_document(1, content(&[("it", 1), ("was", 2)]));
        generation.put_document(2, content(&[("it", 3)]));
        assert_eq!(generation.doc_count(), 2);
        assert_eq!(generation.termfreq(b"it"), 2);
        assert_eq!(generation.collection_freq(b"it"), 4);
        assert_eq!(generation.total_length, 6);
        assert_eq!(generation.last_docid, 2);

        assert!(generation.remove_document(1));
        assert!(!generation.remove_document(1));
        assert_eq!(generation.termfreq(b"was"), 0);
        assert!(!generation.postings.contains_key(b"was".as_slice()));
        assert_eq!(generation.total_length, 3);
        assert_eq!(generation.last_docid, 2);
        assert!(generation.consistency_errors().is_empty());
    }

    #[test]
    fn test_replace_in_place() {
        let mut generation = Generation::new(Uuid::new_v4());
        generation.put_document(1, content(&[("a", 1)]));
        generation.put_document(1, content(&[("b", 2)]));
        assert_eq!(generation.doc_count(), 1);
        assert_eq!(generation.termfreq(b"a"), 0);
        assert_eq!(generation.termfreq(b"b"), 1);
        assert!(generation.consistency_errors().is_empty());
    }

    #[test]
    fn test_empty_term_postlist_covers_all_docs() {
        let mut generation = Generation::new(Uuid::new_v4());
        generation.put_document(3, content(&[("a", 1)]));
        generation.put_document(7, content(&[("b", 1)]));
        let list = generation.postlist(b"").unwrap();
        let docids: Vec<DocId> = list.entries.iter().map(|e| e.docid).collect();
        assert_eq!(docids, vec![3, 7]);
    }

    #[test]
    fn test_terms_with_prefix() {
        let mut generation = Generation::new(Uuid::new_v4());
        generation.put_document(1, content(&[("Hello", 1), ("Hello1", 1), ("Help", 1), ("I", 1)]));
        let terms: Vec<&[u8]> = generation
            .terms_with_prefix(b"Hell")
            .map(|(t, _)| t.as_slice())
            .collect();
        assert_eq!(terms, vec![b"Hello".as_slice(), b"Hello1".as_slice()]);
    }

    #[test]
    fn test_value_stats() {
        let mut generation = Generation::new(Uuid::new_v4());
        generation.put_document(1, content(&[("a", 1)]));
        generation.put_document(2, content(&[("a", 1), ("b", 1)]));
        let stats = generation.value_stats(1);
        assert_eq!(stats.freq, 2);
        assert_eq!(stats.lower_bound, b"v1");
        assert_eq!(stats.upper_bound, b"v2");
        assert_eq!(generation.value_stats(9), ValueStats::default());
    }
}
