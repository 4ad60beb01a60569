//! Position checks for `PHRASE` and `NEAR`.

use crate::TermPos;

/// Which positional constraint a conjunction enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Positional {
    /// Subqueries in order, all within `window` positions.
    Phrase(TermPos),
    /// Subqueries in any order, all within `window` positions.
    Near(TermPos),
}

impl Positional {
    pub fn matches(self, positions: &[Vec<TermPos>]) -> bool {
        if positions.iter().any(Vec::is_empty) {
            return false;
        }
        match self {
            Positional::Phrase(window) => phrase_matches(positions, window),
            Positional::Near(window) => near_matches(positions, window),
        }
    }
}

/// Each list must contribute one position, strictly increasing from the
/// first list to the last, spanning at most `window` positions.
fn phrase_matches(positions: &[Vec<TermPos>], window: TermPos) -> bool {
    let Some((first, rest)) = positions.split_first() else {
        return false;
    };
    'start: for &start in first {
        let mut prev = start;
        for list in rest {
            // The earliest occurrence after `prev` leaves the most room.
            let idx = list.partition_point(|&p| p <= prev);
            let Some(&next) = list.get(idx) else {
                return false;
            };
            if next - start >= window {
                continue 'start;
            }
            prev = next;
        }
        return true;
    }
    false
}

/// Each list must contribute one distinct position, all of them inside a
/// span of at most `window` positions.
fn near_matches(positions: &[Vec<TermPos>], window: TermPos) -> bool {
    let need = positions.len();
    let mut occurrences: Vec<(TermPos, usize)> = positions
        .iter()
        .enumerate()
        .flat_map(|(idx, list)| list.iter().map(move |&p| (p, idx)))
        .collect();
    occurrences.sort_unstable();

    let mut have = vec![0usize; need];
    let mut satisfied = 0usize;
    let mut left = 0usize;
    for right in 0..occurrences.len() {
        let (pos_right, idx_right) = occurrences[right];
        have[idx_right] += 1;
        if have[idx_right] == 1 {
            satisfied += 1;
        }
        while satisfied == need {
            let (pos_left, idx_left) = occurrences[left];
            if pos_right - pos_left < window && distinct(&occurrences[left..=right], need) {
                return true;
            }
            have[idx_left] -= 1;
            if have[idx_left] == 0 {
                satisfied -= 1;
            }
            left += 1;
        }
    }
    false
}

/// Whether every list can be given its own position within `span`.
/// Only repeated terms can share a position, so a greedy assignment in
/// position order is enough.
fn distinct(span: &[(TermPos, usize)], need: usize) -> bool {
    let mut assigned = vec![false; need];
    let mut used: Vec<TermPos> = Vec::with_capacity(need);
    for &(pos, idx) in span {
        if !assigned[idx] && !used.contains(&pos) {
            assigned[idx] = true;
            used.push(pos);
        }
    }
    assigned.iter().all(|a| *a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase() {
        // "was it warm" at 4, 5, 6
        let lists = vec![vec![1, 4], vec![5, 9], vec![6]];
        assert!(Positional::Phrase(3).matches(&lists));
        let reversed = vec![vec![6], vec![5], vec![4]];
        assert!(!Positional::Phrase(3).matches(&reversed));
        let gap = vec![vec![1], vec![3]];
        assert!(!Positional::Phrase(2).matches(&gap));
        assert!(Positional::Phrase(3).matches(&gap));
    }

    #[test]
    fn test_near() {
        let lists = vec![vec![10], vec![8]];
        assert!(Positional::Near(3).matches(&lists));
        assert!(!Positional::Near(2).matches(&lists));
        assert!(!Positional::Near(5).matches(&[vec![1], vec![]]));
    }

    #[test]
    fn test_near_repeated_term_needs_two_positions() {
        assert!(!Positional::Near(5).matches(&[vec![3], vec![3]]));
        assert!(Positional::Near(5).matches(&[vec![3, 4], vec![3, 4]]));
    }
}
