//! Spelling correction against the spelling dictionary.

use std::collections::BTreeMap;

/// Edit distance counting insertions, deletions, substitutions and
/// transpositions of adjacent characters. Gives up and returns `limit + 1`
/// once the distance must exceed `limit`.
pub(crate) fn edit_distance(a: &[char], b: &[char], limit: usize) -> usize {
    if a.len().abs_diff(b.len()) > limit {
        return limit + 1;
    }
    let width = b.len() + 1;
    let mut prev2: Vec<usize> = vec![0; width];
    let mut prev: Vec<usize> = (0..width).collect();
    let mut current: Vec<usize> = vec![0; width];

    for i in 1..=a.len() {
        current[0] = i;
        let mut row_min = current[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (prev[j] + 1).min(current[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(prev2[j - 2] + 1);
            }
            current[j] = best;
            row_min = row_min.min(best);
        }
        if row_min > limit {
            return limit + 1;
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Pick the dictionary word closest to `word`: lowest edit distance first,
/// then highest frequency. Returns an empty vector if nothing is within
/// `max_edit_distance`.
pub(crate) fn suggest(
    spellings: &BTreeMap<Vec<u8>, u32>,
    word: &[u8],
    max_edit_distance: u32,
) -> Vec<u8> {
    let limit = max_edit_distance as usize;
    let target: Vec<char> = String::from_utf8_lossy(word).chars().collect();
    if target.is_empty() {
        return Vec::new();
    }

    let mut best: Option<(usize, u32, &Vec<u8>)> = None;
    for (candidate, &freq) in spellings {
        if candidate.as_slice() == word || freq == 0 {
            continue;
        }
        let chars: Vec<char> = String::from_utf8_lossy(candidate).chars().collect();
        let distance = edit_distance(&target, &chars, limit);
        if distance > limit {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_distance, best_freq, _)) => {
                distance < best_distance || (distance == best_distance && freq > best_freq)
            }
        };
        if better {
            best = Some((distance, freq, candidate));
        }
    }
    best.map(|(_, _, word)| word.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance(&chars("hell"), &chars("hello"), 2), 1);
        assert_eq!(edit_distance(&chars("hell"), &chars("mell"), 2), 1);
        assert_eq!(edit_distance(&chars("teh"), &chars("the"), 2), 1);
        assert_eq!(edit_distance(&chars("abc"), &chars("abc"), 2), 0);
        assert_eq!(edit_distance(&chars("a"), &chars("abcdef"), 2), 3);
    }

    #[test]
    fn test_prefers_frequency_on_equal_distance() {
        let mut spellings = BTreeMap::new();
        spellings.insert(b"hello".to_vec(), 1);
        spellings.insert(b"mell".to_vec(), 2);
        assert_eq!(suggest(&spellings, b"hell", 2), b"mell");
        spellings.insert(b"hello".to_vec(), 3);
        assert_eq!(suggest(&spellings, b"hell", 2), b"hello");
    }

    #[test]
    fn test_nothing_close_enough() {
        let mut spellings = BTreeMap::new();
        spellings.insert(b"elephant".to_vec(), 5);
        assert!(suggest(&spellings, b"cat", 2).is_empty());
        assert!(suggest(&spellings, b"elephant", 2).is_empty());
    }
}
