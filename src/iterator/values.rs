use std::ops::Bound;
use std::sync::Arc;

use crate::DocId;
use crate::iterator::IterState;
use crate::storage::ValueStream;

/// A document's value in one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueItem {
    pub docid: DocId,
    pub value: Vec<u8>,
}

/// Documents with a value set in one slot, in ascending docid order.
#[derive(Debug, Clone)]
pub struct ValueIterator {
    stream: Option<Arc<ValueStream>>,
    current: Option<DocId>,
    state: IterState,
}

impl ValueIterator {
    pub(crate) fn new(stream: Option<Arc<ValueStream>>) -> Self {
        ValueIterator {
            stream,
            current: None,
            state: IterState::Fresh,
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Advance to the first document `>= target` with a value.
    pub fn skip_to(&mut self, target: DocId) -> Option<ValueItem> {
        if self.state == IterState::Exhausted {
            return None;
        }
        let from = match self.current {
            Some(current) if current >= target => Bound::Included(current),
            _ => Bound::Included(target),
        };
        self.land(from)
    }

    /// Whether `docid` has a value, moving to it if so.
    ///
    /// Unlike [`skip_to`](Self::skip_to) this does not move past `docid`
    /// when it has no value.
    pub fn check(&mut self, docid: DocId) -> bool {
        if self.current.is_some_and(|current| current > docid) {
            return false;
        }
        let has = self
            .stream
            .as_ref()
            .is_some_and(|stream| stream.contains_key(&docid));
        if has {
            self.current = Some(docid);
            self.state = IterState::Advanced;
        }
        has
    }

    fn land(&mut self, from: Bound<DocId>) -> Option<ValueItem> {
        let found = self.stream.as_ref().and_then(|stream| {
            stream
                .range((from, Bound::Unbounded))
                .next()
                .map(|(docid, value)| ValueItem {
                    docid: *docid,
                    value: value.clone(),
                })
        });
        match &found {
            Some(item) => {
                self.current = Some(item.docid);
                self.state = IterState::Advanced;
            }
            None => self.state = IterState::Exhausted,
        }
        found
    }
}

impl Iterator for ValueIterator {
    type Item = ValueItem;

    fn next(&mut self) -> Option<ValueItem> {
        if self.state == IterState::Exhausted {
            return None;
        }
        let from = match self.current {
            Some(current) => Bound::Excluded(current),
            None => Bound::Unbounded,
        };
        self.land(from)
    }
}
