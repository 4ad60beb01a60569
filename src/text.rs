//! Text analysis: word splitting, stemming, stopwords and the term generator.
//!
//! ```text
//! "The C++ AT&T deal"
//!        │  NFC, UAX#29 word boundaries
//!        ▼
//! [the] [c++] [at&t] [deal]      words, lowercased
//!        │  Stopper / Stem
//!        ▼
//! terms added to a Document (TermGenerator) or a Query (QueryParser)
//! ```

pub mod stem;
pub mod stopper;
pub mod termgen;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Which words get a stemmed form, and how it is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemStrategy {
    /// Index and search unstemmed words only.
    None,
    /// Keep the unstemmed word and add a `Z`-prefixed stem for words that
    /// start with a letter.
    #[default]
    Some,
    /// Replace every word with its stem, without a `Z` marker.
    All,
    /// Replace every word with its `Z`-prefixed stem.
    AllZ,
}

/// How a [`Stopper`](stopper::Stopper) is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopStrategy {
    /// Stopwords are indexed like any other word.
    None,
    /// Stopwords are skipped entirely.
    All,
    /// Stopwords are indexed unstemmed, but never get a stemmed form.
    #[default]
    Stemmed,
}

/// A word found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Word {
    /// The lowercased word.
    pub text: String,
    /// The word as written.
    pub raw: String,
    /// Byte offset of the word in the normalised text.
    pub offset: usize,
}

/// Characters allowed between two words to join them into one
/// (`AT&T`, `don't`).
fn infix(ch: char) -> Option<char> {
    match ch {
        '\'' | '&' | '\u{b7}' | '\u{5f4}' | '\u{2027}' => Some(ch),
        '\u{2019}' | '\u{201b}' => Some('\''),
        _ => None,
    }
}

/// Characters allowed between two digit runs (`3.14`, `1,000`).
fn infix_digit(ch: char) -> bool {
    matches!(ch, ',' | '.' | ';' | '\u{37e}' | '\u{589}' | '\u{60d}' | '\u{7f8}' | '\u{2044}')
}

fn is_suffix(ch: char) -> bool {
    matches!(ch, '+' | '#')
}

/// Up to this many suffix characters are kept (`c++`, `c#`).
const MAX_SUFFIX: usize = 3;

fn single_char(segment: &str) -> Option<char> {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

pub(crate) fn is_word_segment(segment: &str) -> bool {
    segment
        .chars()
        .next()
        .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
}

fn starts_with_digit(segment: &str) -> bool {
    segment.chars().next().is_some_and(|ch| ch.is_numeric())
}

fn ends_with_digit(segment: &str) -> bool {
    segment.chars().next_back().is_some_and(|ch| ch.is_numeric())
}

/// Split `text` into words.
///
/// Words follow the Unicode word boundary rules, with infix characters
/// joining neighbouring words and trailing `+`/`#` kept as part of the word.
pub(crate) fn words(text: &str) -> Vec<Word> {
    let normalised: String = text.nfc().collect();
    let segments: Vec<(usize, &str)> = normalised.split_word_bound_indices().collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < segments.len() {
        let (offset, segment) = segments[i];
        if !is_word_segment(segment) {
            i += 1;
            continue;
        }
        let mut raw = segment.to_string();
        let mut j = i + 1;
        while j + 1 < segments.len() {
            let Some(ch) = single_char(segments[j].1) else {
                break;
            };
            let next = segments[j + 1].1;
            if !is_word_segment(next) {
                break;
            }
            if let Some(joined) = infix(ch) {
                raw.push(joined);
            } else if infix_digit(ch) && ends_with_digit(&raw) && starts_with_digit(next) {
                raw.push(ch);
            } else {
                break;
            }
            raw.push_str(next);
            j += 2;
        }

        let suffixes = segments[j..]
            .iter()
            .take_while(|(_, s)| single_char(s).is_some_and(is_suffix))
            .count();
        let followed_by_word = segments
            .get(j + suffixes)
            .is_some_and(|(_, s)| is_word_segment(s));
        if suffixes > 0 && suffixes <= MAX_SUFFIX && !followed_by_word {
            for (_, s) in &segments[j..j + suffixes] {
                raw.push_str(s);
            }
            j += suffixes;
        }

        out.push(Word {
            text: raw.to_lowercase(),
            raw,
            offset,
        });
        i = j;
    }
    out
}

/// Whether a term is a candidate for stemming: it must start with a letter.
pub(crate) fn should_stem(term: &str) -> bool {
    term.chars().next().is_some_and(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str) -> Vec<String> {
        words(text).into_iter().map(|w| w.text).collect()
    }

    #[test]
    fn test_simple_words() {
        assert_eq!(texts("Hello, World!"), vec!["hello", "world"]);
        assert!(texts("...  --- ").is_empty());
    }

    #[test]
    fn test_infix_and_suffix() {
        assert_eq!(texts("AT&T uses C++ and C#"), vec!["at&t", "uses", "c++", "and", "c#"]);
        assert_eq!(texts("don\u{2019}t"), vec!["don't"]);
        assert_eq!(texts("pi is 3.14"), vec!["pi", "is", "3.14"]);
    }

    #[test]
    fn test_offsets_and_raw() {
        let found = words("was It warm");
        assert_eq!(found[1].raw, "It");
        assert_eq!(found[1].offset, 4);
    }

    #[test]
    fn test_should_stem() {
        assert!(should_stem("running"));
        assert!(!should_stem("2000s"));
        assert!(!should_stem(""));
    }
}
