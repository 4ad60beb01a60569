//! Match deciders: user filters applied to candidate documents.

use std::fmt;

use ahash::AHashSet;

use crate::ValueNo;
use crate::document::Document;
use crate::error::Result;

/// Accepts or rejects a document that matched the query. Errors abort the
/// match and reach the caller unchanged.
pub trait MatchDecider: Send + Sync {
    fn accept(&self, doc: &Document) -> Result<bool>;
}

impl<F> MatchDecider for F
where
    F: Fn(&Document) -> Result<bool> + Send + Sync,
{
    fn accept(&self, doc: &Document) -> Result<bool> {
        self(doc)
    }
}

/// Accepts documents whose value in a slot is (or, when not inclusive, is
/// not) one of a set.
#[derive(Clone)]
pub struct ValueSetMatchDecider {
    slot: ValueNo,
    inclusive: bool,
    values: AHashSet<Vec<u8>>,
}

impl ValueSetMatchDecider {
    pub fn new(slot: ValueNo, inclusive: bool) -> Self {
        ValueSetMatchDecider {
            slot,
            inclusive,
            values: AHashSet::new(),
        }
    }

    pub fn add_value<V: Into<Vec<u8>>>(&mut self, value: V) {
        self.values.insert(value.into());
    }

    pub fn remove_value<V: AsRef<[u8]>>(&mut self, value: V) {
        self.values.remove(value.as_ref());
    }
}

impl MatchDecider for ValueSetMatchDecider {
    fn accept(&self, doc: &Document) -> Result<bool> {
        Ok(self.values.contains(doc.get_value(self.slot)) == self.inclusive)
    }
}

impl fmt::Debug for ValueSetMatchDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSetMatchDecider")
            .field("slot", &self.slot)
            .field("inclusive", &self.inclusive)
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;

    fn doc(value: &str) -> Document {
        let mut doc = Document::new();
        doc.add_value(0, value);
        doc
    }

    #[test]
    fn test_value_set() {
        let mut decider = ValueSetMatchDecider::new(0, true);
        decider.add_value("yes");
        assert!(decider.accept(&doc("yes")).unwrap());
        assert!(!decider.accept(&doc("no")).unwrap());

        let mut exclusive = ValueSetMatchDecider::new(0, false);
        exclusive.add_value("yes");
        exclusive.add_value("maybe");
        exclusive.remove_value("maybe");
        assert!(!exclusive.accept(&doc("yes")).unwrap());
        assert!(exclusive.accept(&doc("maybe")).unwrap());
    }

    #[test]
    fn test_closure_decider() {
        let decider = |doc: &Document| -> Result<bool> {
            if doc.get_value(0) == b"boom" {
                return Err(QuarryError::callback("decider failed"));
            }
            Ok(true)
        };
        assert!(decider.accept(&doc("fine")).unwrap());
        assert!(matches!(decider.accept(&doc("boom")), Err(QuarryError::Callback(_))));
    }
}
