//! Documents: opaque data, a term vector and numbered value slots.
//!
//! A [`Document`] is built client-side and handed to
//! [`WritableDatabase::add_document`](crate::WritableDatabase::add_document).
//! Documents fetched from a database remember their docid and the snapshot
//! they came from, so their termlist can report collection term frequencies.
//!
//! Contents are shared copy-on-write: fetching a stored document is cheap and
//! the first mutation clones the underlying content.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{QuarryError, Result};
use crate::iterator::TermIterator;
use crate::storage::Generation;
use crate::util::escape::escape_bytes;
use crate::util::pack::{Packer, Unpacker};
use crate::{DocId, TermCount, TermPos, ValueNo};

/// Within-document information for a single term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TermEntry {
    pub wdf: TermCount,
    pub positions: Vec<TermPos>,
}

/// The stored part of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DocumentContent {
    pub data: Vec<u8>,
    pub terms: BTreeMap<Vec<u8>, TermEntry>,
    pub values: BTreeMap<ValueNo, Vec<u8>>,
}

impl DocumentContent {
    /// Document length: the sum of all wdfs.
    pub fn length(&self) -> u64 {
        self.terms.values().map(|entry| u64::from(entry.wdf)).sum()
    }
}

#[derive(Clone)]
struct DocumentOrigin {
    docid: DocId,
    generation: Arc<Generation>,
}

/// A document: data, terms with positions and wdf, and value slots.
#[derive(Clone, Default)]
pub struct Document {
    content: Arc<DocumentContent>,
    origin: Option<DocumentOrigin>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document::default()
    }

    pub(crate) fn from_stored(
        docid: DocId,
        content: Arc<DocumentContent>,
        generation: Arc<Generation>,
    ) -> Self {
        Document {
            content,
            origin: Some(DocumentOrigin { docid, generation }),
        }
    }

    pub(crate) fn content(&self) -> &Arc<DocumentContent> {
        &self.content
    }

    fn content_mut(&mut self) -> &mut DocumentContent {
        Arc::make_mut(&mut self.content)
    }

    /// The docid this document was read from, or 0 for a fresh document.
    pub fn get_docid(&self) -> DocId {
        self.origin.as_ref().map_or(0, |origin| origin.docid)
    }

    pub fn get_data(&self) -> &[u8] {
        &self.content.data
    }

    pub fn set_data<D: Into<Vec<u8>>>(&mut self, data: D) {
        self.content_mut().data = data.into();
    }

    /// Value in `slot`, or the empty string if the slot is unused.
    pub fn get_value(&self, slot: ValueNo) -> &[u8] {
        self.content
            .values
            .get(&slot)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Set the value in `slot`. An empty value clears the slot.
    pub fn add_value<V: Into<Vec<u8>>>(&mut self, slot: ValueNo, value: V) {
        let value = value.into();
        let content = self.content_mut();
        if value.is_empty() {
            content.values.remove(&slot);
        } else {
            content.values.insert(slot, value);
        }
    }

    pub fn remove_value(&mut self, slot: ValueNo) {
        if self.content.values.contains_key(&slot) {
            self.content_mut().values.remove(&slot);
        }
    }

    pub fn clear_values(&mut self) {
        if !self.content.values.is_empty() {
            self.content_mut().values.clear();
        }
    }

    pub fn values_count(&self) -> usize {
        self.content.values.len()
    }

    /// Set values in ascending slot order.
    pub fn values(&self) -> impl Iterator<Item = (ValueNo, &[u8])> + '_ {
        self.content
            .values
            .iter()
            .map(|(slot, value)| (*slot, value.as_slice()))
    }

    /// Add an occurrence of `term` at `pos`, increasing its wdf by `wdf_inc`.
    pub fn add_posting<T: AsRef<[u8]>>(
        &mut self,
        term: T,
        pos: TermPos,
        wdf_inc: TermCount,
    ) -> Result<()> {
        let term = term.as_ref();
        check_term_name(term)?;
        let entry = self.content_mut().terms.entry(term.to_vec()).or_default();
        entry.wdf = entry.wdf.saturating_add(wdf_inc);
        if let Err(idx) = entry.positions.binary_search(&pos) {
            entry.positions.insert(idx, pos);
        }
        Ok(())
    }

    /// Add `term` without positional information.
    pub fn add_term<T: AsRef<[u8]>>(&mut self, term: T, wdf_inc: TermCount) -> Result<()> {
        let term = term.as_ref();
        check_term_name(term)?;
        let entry = self.content_mut().terms.entry(term.to_vec()).or_default();
        entry.wdf = entry.wdf.saturating_add(wdf_inc);
        Ok(())
    }

    /// Add a term which contributes nothing to the document length.
    pub fn add_boolean_term<T: AsRef<[u8]>>(&mut self, term: T) -> Result<()> {
        self.add_term(term, 0)
    }

    pub fn remove_posting<T: AsRef<[u8]>>(
        &mut self,
        term: T,
        pos: TermPos,
        wdf_dec: TermCount,
    ) -> Result<()> {
        let term = term.as_ref();
        let Some(existing) = self.content.terms.get(term) else {
            return Err(QuarryError::invalid_argument(format!(
                "Term '{}' is not present in document, in Document::remove_posting()",
                escape_bytes(term)
            )));
        };
        let Ok(idx) = existing.positions.binary_search(&pos) else {
            return Err(QuarryError::invalid_argument(format!(
                "Position {pos} not in list for term '{}', in Document::remove_posting()",
                escape_bytes(term)
            )));
        };
        if let Some(entry) = self.content_mut().terms.get_mut(term) {
            entry.positions.remove(idx);
            entry.wdf = entry.wdf.saturating_sub(wdf_dec);
        }
        Ok(())
    }

    pub fn remove_term<T: AsRef<[u8]>>(&mut self, term: T) -> Result<()> {
        let term = term.as_ref();
        if !self.content.terms.contains_key(term) {
            return Err(QuarryError::invalid_argument(format!(
                "Term '{}' is not present in document, in Document::remove_term()",
                escape_bytes(term)
            )));
        }
        self.content_mut().terms.remove(term);
        Ok(())
    }

    pub fn clear_terms(&mut self) {
        if !self.content.terms.is_empty() {
            self.content_mut().terms.clear();
        }
    }

    pub fn termlist_count(&self) -> usize {
        self.content.terms.len()
    }

    /// Document length, the sum of the wdfs of all terms.
    pub fn length(&self) -> u64 {
        self.content.length()
    }

    /// Iterate the document's terms in ascending order.
    pub fn termlist(&self) -> TermIterator {
        TermIterator::for_document(
            Arc::clone(&self.content),
            self.origin
                .as_ref()
                .map(|origin| Arc::clone(&origin.generation)),
        )
    }

    /// Encode the document, including data, terms and values.
    pub fn serialise(&self) -> Vec<u8> {
        let mut packer = Packer::new();
        let content = &self.content;
        packer.uint(content.values.len() as u64);
        for (slot, value) in &content.values {
            packer.uint(u64::from(*slot)).bytes(value);
        }
        packer.uint(content.terms.len() as u64);
        for (term, entry) in &content.terms {
            packer.bytes(term).uint(u64::from(entry.wdf));
            packer.uint(entry.positions.len() as u64);
            let mut last = 0;
            for &pos in &entry.positions {
                packer.uint(u64::from(pos - last));
                last = pos;
            }
        }
        packer.bytes(&content.data);
        packer.into_inner()
    }

    /// Decode a document produced by [`Document::serialise`].
    pub fn unserialise(bytes: &[u8]) -> Result<Document> {
        let mut unpacker = Unpacker::new(bytes);
        let mut content = DocumentContent::default();

        let nvalues = unpacker.uint()?;
        for _ in 0..nvalues {
            let slot = unpacker.u32()?;
            let value = unpacker.bytes()?.to_vec();
            content.values.insert(slot, value);
        }

        let nterms = unpacker.uint()?;
        for _ in 0..nterms {
            let term = unpacker.bytes()?.to_vec();
            let wdf = unpacker.u32()?;
            let npos = unpacker.uint()?;
            let mut positions = Vec::with_capacity(npos.min(1024) as usize);
            let mut last: TermPos = 0;
            for _ in 0..npos {
                let delta = unpacker.u32()?;
                last = last.checked_add(delta).ok_or_else(|| {
                    QuarryError::serialisation("position overflow in serialised document")
                })?;
                positions.push(last);
            }
            content.terms.insert(term, TermEntry { wdf, positions });
        }

        content.data = unpacker.bytes()?.to_vec();
        unpacker.finish()?;

        Ok(Document {
            content: Arc::new(content),
            origin: None,
        })
    }

    pub fn get_description(&self) -> String {
        let mut desc = String::from("Document(");
        if let Some(origin) = &self.origin {
            desc.push_str(&format!("docid={}, ", origin.docid));
        }
        desc.push_str(&format!(
            "data={}, terms={}, values={})",
            escape_bytes(&self.content.data),
            self.content.terms.len(),
            self.content.values.len()
        ));
        desc
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("docid", &self.get_docid())
            .field("data_len", &self.content.data.len())
            .field("terms", &self.content.terms.len())
            .field("values", &self.content.values.len())
            .finish()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

fn check_term_name(term: &[u8]) -> Result<()> {
    if term.is_empty() {
        return Err(QuarryError::invalid_argument("Empty termnames aren't allowed."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.set_data(b"is it\0cold?".to_vec());
        doc.add_term("is", 1).unwrap();
        doc.add_posting("it", 1, 1).unwrap();
        doc.add_posting("cold", 2, 1).unwrap();
        doc.add_posting("it", 7, 6).unwrap();
        doc.add_value(0, vec![0xa4]);
        doc.add_value(9, "nine");
        doc
    }

    #[test]
    fn test_wdf_and_positions() {
        let doc = sample();
        let entry = doc.content().terms.get(b"it".as_slice()).unwrap();
        assert_eq!(entry.wdf, 7);
        assert_eq!(entry.positions, vec![1, 7]);
        assert_eq!(doc.length(), 9);
        assert_eq!(doc.termlist_count(), 3);
    }

    #[test]
    fn test_serialise_round_trip_keeps_nul_bytes() {
        let doc = sample();
        let decoded = Document::unserialise(&doc.serialise()).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.get_data(), b"is it\0cold?");
        assert_eq!(decoded.get_value(9), b"nine");
    }

    #[test]
    fn test_unserialise_rejects_junk() {
        let mut bytes = sample().serialise();
        bytes.push(0);
        assert!(Document::unserialise(&bytes).is_err());
        assert!(Document::unserialise(&bytes[..3]).is_err());
    }

    #[test]
    fn test_empty_value_clears_slot() {
        let mut doc = sample();
        doc.add_value(9, "");
        assert_eq!(doc.values_count(), 1);
        assert_eq!(doc.get_value(9), b"");
    }

    #[test]
    fn test_remove_term_errors() {
        let mut doc = sample();
        assert!(matches!(
            doc.remove_term("missing"),
            Err(QuarryError::InvalidArgument(_))
        ));
        assert!(doc.remove_posting("it", 3, 1).is_err());
        doc.remove_posting("it", 7, 6).unwrap();
        let entry = doc.content().terms.get(b"it".as_slice()).unwrap();
        assert_eq!(entry.wdf, 1);
        assert_eq!(entry.positions, vec![1]);
        doc.remove_term("it").unwrap();
        assert_eq!(doc.termlist_count(), 2);
    }

    #[test]
    fn test_empty_term_rejected() {
        let mut doc = Document::new();
        assert!(doc.add_term("", 1).is_err());
        assert!(doc.add_posting("", 1, 1).is_err());
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let doc = sample();
        let mut copy = doc.clone();
        copy.set_data("changed");
        assert_eq!(doc.get_data(), b"is it\0cold?");
        assert_eq!(copy.get_data(), b"changed");
    }
}
