use crate::TermPos;
use crate::iterator::IterState;

/// Ascending positions of a term within one document.
#[derive(Debug, Clone, Default)]
pub struct PositionIterator {
    positions: Vec<TermPos>,
    next: usize,
    state: IterState,
}

impl PositionIterator {
    pub(crate) fn new(positions: Vec<TermPos>) -> Self {
        PositionIterator {
            positions,
            next: 0,
            state: IterState::Fresh,
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Total number of positions, independent of iteration progress.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Advance to the first position `>= target`.
    ///
    /// Never moves backwards: if the current position already satisfies the
    /// target it is returned again.
    pub fn skip_to(&mut self, target: TermPos) -> Option<TermPos> {
        match self.state {
            IterState::Exhausted => return None,
            IterState::Advanced => {
                let current = self.positions[self.next - 1];
                if current >= target {
                    return Some(current);
                }
            }
            IterState::Fresh => {}
        }
        let idx = self.next + self.positions[self.next..].partition_point(|&p| p < target);
        self.land(idx)
    }

    fn land(&mut self, idx: usize) -> Option<TermPos> {
        match self.positions.get(idx) {
            Some(&pos) => {
                self.next = idx + 1;
                self.state = IterState::Advanced;
                Some(pos)
            }
            None => {
                self.next = self.positions.len();
                self.state = IterState::Exhausted;
                None
            }
        }
    }
}

impl Iterator for PositionIterator {
    type Item = TermPos;

    fn next(&mut self) -> Option<TermPos> {
        if self.state == IterState::Exhausted {
            return None;
        }
        self.land(self.next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.positions.len() - self.next;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_to_is_monotonic() {
        let mut iter = PositionIterator::new(vec![2, 5, 9]);
        assert_eq!(iter.skip_to(3), Some(5));
        assert_eq!(iter.skip_to(1), Some(5));
        assert_eq!(iter.next(), Some(9));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.state(), IterState::Exhausted);
        assert_eq!(iter.skip_to(1), None);
    }

    #[test]
    fn test_skip_past_end() {
        let mut iter = PositionIterator::new(vec![1]);
        assert_eq!(iter.skip_to(10), None);
        assert_eq!(iter.len(), 1);
    }
}
