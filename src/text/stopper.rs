//! Stopword lists.

use std::fmt;
use std::fs;
use std::path::Path;

use ahash::AHashSet;
use parking_lot::RwLock;

use crate::error::{QuarryError, Result};

/// Decides whether a word is a stopword.
///
/// Shared between a [`QueryParser`](crate::QueryParser) or
/// [`TermGenerator`](crate::TermGenerator) and the caller, so words added
/// after installation take effect on the next use.
pub trait Stopper: Send + Sync {
    fn is_stopword(&self, word: &str) -> Result<bool>;

    fn description(&self) -> String {
        "Stopper()".to_string()
    }
}

/// A stopper backed by an in-memory word set.
#[derive(Default)]
pub struct SimpleStopper {
    words: RwLock<AHashSet<String>>,
}

impl SimpleStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimpleStopper {
            words: RwLock::new(words.into_iter().map(Into::into).collect()),
        }
    }

    /// Load whitespace-separated stopwords from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            QuarryError::invalid_argument(format!(
                "Stopword file '{}' not found: {e}",
                path.display()
            ))
        })?;
        Ok(Self::from_words(text.split_whitespace()))
    }

    pub fn add(&self, word: impl Into<String>) {
        self.words.write().insert(word.into());
    }

    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }
}

impl Stopper for SimpleStopper {
    fn is_stopword(&self, word: &str) -> Result<bool> {
        Ok(self.words.read().contains(word))
    }

    fn description(&self) -> String {
        format!("SimpleStopper({} words)", self.len())
    }
}

impl fmt::Debug for SimpleStopper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_add_after_creation() {
        let stopper = SimpleStopper::new();
        assert!(!stopper.is_stopword("a").unwrap());
        stopper.add("a");
        assert!(stopper.is_stopword("a").unwrap());
        assert_eq!(stopper.description(), "SimpleStopper(1 words)");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "the a\nan").unwrap();
        let stopper = SimpleStopper::from_file(file.path()).unwrap();
        assert_eq!(stopper.len(), 3);
        assert!(stopper.is_stopword("an").unwrap());
    }

    #[test]
    fn test_missing_file() {
        let result = SimpleStopper::from_file("/nonexistent/stopwords.txt");
        assert!(matches!(result, Err(QuarryError::InvalidArgument(_))));
    }
}
