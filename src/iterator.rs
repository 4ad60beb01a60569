//! Iterators over terms, postings, positions and values.
//!
//! All iterators here are ordinary Rust [`Iterator`]s with an additional
//! monotonic `skip_to`. Items returned by term and posting iterators expose
//! some properties eagerly (copied into the item) and some lazily (read from
//! the source when asked). A lazy property can only be read while the
//! iterator is still positioned on the item; afterwards it fails with
//! `"Iterator has moved, and does not support random access"`.

mod positions;
mod postings;
mod terms;
mod values;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{QuarryError, Result};

pub use positions::PositionIterator;
pub use postings::{PostingItem, PostingIterator};
pub use terms::{TermItem, TermIterator};
pub use values::{ValueItem, ValueIterator};

/// Where an iterator is in its traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterState {
    /// Not yet advanced.
    #[default]
    Fresh,
    /// Positioned on an item.
    Advanced,
    /// Past the last item.
    Exhausted,
}

/// Counts moves of an iterator so that items can detect staleness.
#[derive(Debug, Clone, Default)]
pub(crate) struct MoveTracker(Arc<AtomicU64>);

impl MoveTracker {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticket(&self) -> MoveTicket {
        MoveTicket {
            tracker: self.clone(),
            epoch: self.0.load(Ordering::Relaxed),
        }
    }
}

/// Issued with an item; valid until the iterator moves again.
#[derive(Debug, Clone)]
pub(crate) struct MoveTicket {
    tracker: MoveTracker,
    epoch: u64,
}

impl MoveTicket {
    pub fn check(&self) -> Result<()> {
        if self.tracker.0.load(Ordering::Relaxed) == self.epoch {
            Ok(())
        } else {
            Err(QuarryError::invalid_operation(
                "Iterator has moved, and does not support random access",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_expires_on_move() {
        let tracker = MoveTracker::default();
        let ticket = tracker.ticket();
        assert!(ticket.check().is_ok());
        tracker.bump();
        assert!(matches!(ticket.check(), Err(QuarryError::InvalidOperation(_))));
        assert!(tracker.ticket().check().is_ok());
    }
}
