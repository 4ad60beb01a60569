//! Match spies: observers of every document the matcher accepts.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

use crate::document::Document;
use crate::error::Result;
use crate::iterator::TermIterator;
use crate::{DocCount, ValueNo};

/// Sees each candidate after the match decider and weight cutoff, before
/// the result set is trimmed. Shared with the caller, who reads the
/// tallies once the match has run.
pub trait MatchSpy: Send + Sync {
    fn observe(&self, doc: &Document, weight: f64) -> Result<()>;

    fn description(&self) -> String {
        "MatchSpy()".to_string()
    }
}

#[derive(Debug, Default)]
struct Tally {
    total: DocCount,
    counts: BTreeMap<Vec<u8>, DocCount>,
}

/// Counts how often each value of a slot occurs among the matches.
pub struct ValueCountMatchSpy {
    slot: ValueNo,
    tally: Mutex<Tally>,
}

impl ValueCountMatchSpy {
    pub fn new(slot: ValueNo) -> Self {
        ValueCountMatchSpy {
            slot,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Documents observed, including those without a value.
    pub fn get_total(&self) -> DocCount {
        self.tally.lock().total
    }

    /// Observed values in ascending order; termfreq is the count.
    pub fn values(&self) -> TermIterator {
        let rows = self
            .tally
            .lock()
            .counts
            .iter()
            .map(|(value, count)| (value.clone(), *count))
            .collect();
        TermIterator::with_frequencies(rows)
    }

    /// The `n` most frequent values, most frequent first. Equal counts are
    /// ordered by value.
    pub fn top_values(&self, n: usize) -> TermIterator {
        let mut rows: Vec<(Vec<u8>, DocCount)> = self
            .tally
            .lock()
            .counts
            .iter()
            .map(|(value, count)| (value.clone(), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        TermIterator::with_frequencies(rows)
    }

    pub fn clear(&self) {
        *self.tally.lock() = Tally::default();
    }
}

impl MatchSpy for ValueCountMatchSpy {
    fn observe(&self, doc: &Document, _weight: f64) -> Result<()> {
        let mut tally = self.tally.lock();
        tally.total += 1;
        let value = doc.get_value(self.slot);
        if !value.is_empty() {
            *tally.counts.entry(value.to_vec()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn description(&self) -> String {
        let tally = self.tally.lock();
        format!(
            "ValueCountMatchSpy({} docs seen, {} distinct values)",
            tally.total,
            tally.counts.len()
        )
    }
}

impl fmt::Debug for ValueCountMatchSpy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: &str) -> Document {
        let mut doc = Document::new();
        if !value.is_empty() {
            doc.add_value(2, value);
        }
        doc
    }

    #[test]
    fn test_counts() {
        let spy = ValueCountMatchSpy::new(2);
        for value in ["red", "blue", "red", "", "green", "red", "blue"] {
            spy.observe(&doc(value), 1.0).unwrap();
        }
        assert_eq!(spy.get_total(), 7);

        let values: Vec<(Vec<u8>, DocCount)> = spy
            .values()
            .map(|item| (item.term().to_vec(), item.termfreq().unwrap()))
            .collect();
        assert_eq!(
            values,
            vec![(b"blue".to_vec(), 2), (b"green".to_vec(), 1), (b"red".to_vec(), 3)]
        );

        let top: Vec<Vec<u8>> = spy.top_values(2).map(|item| item.into_term()).collect();
        assert_eq!(top, vec![b"red".to_vec(), b"blue".to_vec()]);

        spy.clear();
        assert_eq!(spy.get_total(), 0);
    }
}
