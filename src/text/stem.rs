//! Stemming algorithms.
//!
//! [`Stem`] is a cheap handle on a stemming algorithm: a built-in language,
//! a user-supplied [`Stemmer`], or nothing at all.

mod english;

use std::fmt;
use std::sync::Arc;

use crate::error::{QuarryError, Result};

/// A stemming algorithm.
///
/// Implement this to plug a custom stemmer into the query parser or the
/// term generator. Errors propagate to the caller unchanged.
pub trait Stemmer: Send + Sync {
    /// Reduce `word` to its stem.
    fn stem_word(&self, word: &str) -> Result<String>;

    /// Description used in [`Stem::get_description`].
    fn description(&self) -> String {
        "user".to_string()
    }
}

struct English;

impl Stemmer for English {
    fn stem_word(&self, word: &str) -> Result<String> {
        Ok(english::stem(word))
    }

    fn description(&self) -> String {
        "english".to_string()
    }
}

/// A stemmer handle. The default handle does not stem.
#[derive(Clone, Default)]
pub struct Stem {
    algorithm: Option<Arc<dyn Stemmer>>,
}

impl Stem {
    /// Stemmer for `language`: `"en"` or `"english"`, or `"none"` (or the
    /// empty string) for no stemming.
    pub fn new(language: &str) -> Result<Stem> {
        match language {
            "en" | "english" => Ok(Stem::from_stemmer(English)),
            "" | "none" => Ok(Stem::none()),
            other => Err(QuarryError::invalid_argument(format!(
                "Language code {other} unknown"
            ))),
        }
    }

    pub fn none() -> Stem {
        Stem { algorithm: None }
    }

    pub fn from_stemmer<S: Stemmer + 'static>(stemmer: S) -> Stem {
        Stem {
            algorithm: Some(Arc::new(stemmer)),
        }
    }

    /// Languages accepted by [`Stem::new`], space separated.
    pub fn get_available_languages() -> &'static str {
        "english"
    }

    pub fn is_none(&self) -> bool {
        self.algorithm.is_none()
    }

    /// Stem `word`; without an algorithm the word comes back unchanged.
    pub fn stem_word(&self, word: &str) -> Result<String> {
        match &self.algorithm {
            Some(algorithm) => algorithm.stem_word(word),
            None => Ok(word.to_string()),
        }
    }

    pub fn get_description(&self) -> String {
        match &self.algorithm {
            Some(algorithm) => format!("Stem({})", algorithm.description()),
            None => "Stem(none)".to_string(),
        }
    }
}

impl fmt::Debug for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Vowelless;

    impl Stemmer for Vowelless {
        fn stem_word(&self, word: &str) -> Result<String> {
            Ok(word.chars().filter(|c| !"aeiou".contains(*c)).collect())
        }
    }

    #[test]
    fn test_languages() {
        let stem = Stem::new("en").unwrap();
        assert_eq!(stem.stem_word("questions").unwrap(), "question");
        assert_eq!(stem.get_description(), "Stem(english)");
        assert!(Stem::new("none").unwrap().is_none());
        assert!(matches!(
            Stem::new("klingon"),
            Err(QuarryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_none_passes_through() {
        assert_eq!(Stem::none().stem_word("Running").unwrap(), "Running");
    }

    #[test]
    fn test_user_stemmer() {
        let stem = Stem::from_stemmer(Vowelless);
        assert_eq!(stem.stem_word("hello").unwrap(), "hll");
        assert_eq!(stem.get_description(), "Stem(user)");
    }
}
