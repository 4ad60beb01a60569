//! Result ordering and sort keys.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::ValueNo;
use crate::document::Document;
use crate::error::Result;
use crate::matcher::Candidate;

/// Tie-break order for documents of equal rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocidOrder {
    #[default]
    Ascending,
    Descending,
    /// Whatever is fastest; currently ascending.
    DontCare,
}

/// Builds a sort key for a document.
pub trait KeyMaker: Send + Sync {
    fn make_key(&self, doc: &Document) -> Result<Vec<u8>>;
}

impl<F> KeyMaker for F
where
    F: Fn(&Document) -> Result<Vec<u8>> + Send + Sync,
{
    fn make_key(&self, doc: &Document) -> Result<Vec<u8>> {
        self(doc)
    }
}

/// Sorts on several value slots in turn, each ascending or descending.
///
/// The slot values are joined into one key whose byte order is the wanted
/// order:
///
/// ```text
/// ascending:  value with \0 → \0\xff, then \0\0 (omitted after the last)
/// descending: each byte b → 255 - b, \0 → \xff\0, then \xff\xff
/// ```
#[derive(Debug, Clone, Default)]
pub struct MultiValueKeyMaker {
    slots: Vec<(ValueNo, bool, Vec<u8>)>,
}

impl MultiValueKeyMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort on `slot`; `reverse` sorts it descending.
    pub fn add_value(&mut self, slot: ValueNo, reverse: bool) {
        self.add_value_with_default(slot, reverse, Vec::new());
    }

    /// As [`add_value`](Self::add_value), using `default` for documents
    /// with no value in `slot`.
    pub fn add_value_with_default<V: Into<Vec<u8>>>(&mut self, slot: ValueNo, reverse: bool, default: V) {
        self.slots.push((slot, reverse, default.into()));
    }
}

impl KeyMaker for MultiValueKeyMaker {
    fn make_key(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut key = Vec::new();
        for (idx, (slot, reverse, default)) in self.slots.iter().enumerate() {
            let last = idx + 1 == self.slots.len();
            let mut value = doc.get_value(*slot);
            if value.is_empty() {
                value = default.as_slice();
            }
            if *reverse {
                for &byte in value {
                    key.push(255 - byte);
                    if byte == 0 {
                        key.push(0);
                    }
                }
                key.extend_from_slice(b"\xff\xff");
            } else {
                for &byte in value {
                    key.push(byte);
                    if byte == 0 {
                        key.push(0xff);
                    }
                }
                if !last {
                    key.extend_from_slice(b"\0\0");
                }
            }
        }
        Ok(key)
    }
}

/// Where the sort key of a document comes from.
#[derive(Clone)]
pub(crate) enum SortKey {
    Value(ValueNo),
    Maker(Arc<dyn KeyMaker>),
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Value(slot) => write!(f, "Value({slot})"),
            SortKey::Maker(_) => f.write_str("KeyMaker"),
        }
    }
}

/// How relevance and the sort key combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SortBy {
    #[default]
    Relevance,
    Key,
    KeyThenRelevance,
    RelevanceThenKey,
}

/// Total order over match candidates; `Less` ranks first.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Order {
    pub by: SortBy,
    /// Sort keys descending instead of ascending.
    pub reverse: bool,
    pub docid_order: DocidOrder,
}

impl Order {
    pub fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let by_weight = || b.weight.total_cmp(&a.weight);
        let by_key = || {
            let ord = a.sort_key.cmp(&b.sort_key);
            if self.reverse { ord.reverse() } else { ord }
        };
        let primary = match self.by {
            SortBy::Relevance => by_weight(),
            SortBy::Key => by_key(),
            SortBy::KeyThenRelevance => by_key().then_with(by_weight),
            SortBy::RelevanceThenKey => by_weight().then_with(by_key),
        };
        primary.then_with(|| match self.docid_order {
            DocidOrder::Descending => b.docid.cmp(&a.docid),
            DocidOrder::Ascending | DocidOrder::DontCare => a.docid.cmp(&b.docid),
        })
    }
}
