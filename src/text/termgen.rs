//! Turning free text into document terms.

use std::sync::Arc;

use crate::document::Document;
use crate::error::Result;
use crate::text::stem::Stem;
use crate::text::stopper::Stopper;
use crate::text::{StemStrategy, StopStrategy, should_stem, words};
use crate::{TermCount, TermPos};

/// Words longer than this many bytes are not indexed.
pub const DEFAULT_MAX_WORD_LENGTH: usize = 64;

/// Indexes text into a [`Document`].
///
/// Each word becomes a term carrying its position. With a stemmer and the
/// default [`StemStrategy::Some`], words starting with a letter also get a
/// `Z`-prefixed stemmed term without positions, which is what the
/// [`QueryParser`](crate::QueryParser) searches for by default.
pub struct TermGenerator {
    document: Document,
    stemmer: Stem,
    stopper: Option<Arc<dyn Stopper>>,
    stem_strategy: StemStrategy,
    stop_strategy: StopStrategy,
    max_word_length: usize,
    termpos: TermPos,
}

impl Default for TermGenerator {
    fn default() -> Self {
        TermGenerator {
            document: Document::new(),
            stemmer: Stem::none(),
            stopper: None,
            stem_strategy: StemStrategy::default(),
            stop_strategy: StopStrategy::default(),
            max_word_length: DEFAULT_MAX_WORD_LENGTH,
            termpos: 0,
        }
    }
}

impl TermGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stemmer(&mut self, stemmer: Stem) {
        self.stemmer = stemmer;
    }

    pub fn set_stopper(&mut self, stopper: Option<Arc<dyn Stopper>>) {
        self.stopper = stopper;
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) {
        self.stem_strategy = strategy;
    }

    pub fn set_stopper_strategy(&mut self, strategy: StopStrategy) {
        self.stop_strategy = strategy;
    }

    pub fn set_max_word_length(&mut self, length: usize) {
        self.max_word_length = length;
    }

    /// Index into `document` from now on. The term position restarts at 0.
    pub fn set_document(&mut self, document: Document) {
        self.document = document;
        self.termpos = 0;
    }

    pub fn get_document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn get_termpos(&self) -> TermPos {
        self.termpos
    }

    pub fn set_termpos(&mut self, termpos: TermPos) {
        self.termpos = termpos;
    }

    /// Leave a gap in the positions, so phrases can't span two fields.
    pub fn increase_termpos(&mut self, delta: TermPos) {
        self.termpos = self.termpos.saturating_add(delta);
    }

    /// Index `text` with positions, each term prefixed by `prefix`.
    pub fn index_text(&mut self, text: &str, wdf_inc: TermCount, prefix: &str) -> Result<()> {
        self.index(text, wdf_inc, prefix, true)
    }

    pub fn index_text_without_positions(
        &mut self,
        text: &str,
        wdf_inc: TermCount,
        prefix: &str,
    ) -> Result<()> {
        self.index(text, wdf_inc, prefix, false)
    }

    fn is_stopword(&self, term: &str) -> Result<bool> {
        match &self.stopper {
            Some(stopper) => stopper.is_stopword(term),
            None => Ok(false),
        }
    }

    fn index(&mut self, text: &str, wdf_inc: TermCount, prefix: &str, positions: bool) -> Result<()> {
        let stop_strategy = if self.stopper.is_some() {
            self.stop_strategy
        } else {
            StopStrategy::None
        };

        for word in words(text) {
            let term = word.text;
            if term.len() > self.max_word_length {
                continue;
            }
            if stop_strategy == StopStrategy::All && self.is_stopword(&term)? {
                continue;
            }

            if matches!(self.stem_strategy, StemStrategy::Some | StemStrategy::None) {
                let unstemmed = format!("{prefix}{term}");
                if positions {
                    self.termpos += 1;
                    self.document.add_posting(&unstemmed, self.termpos, wdf_inc)?;
                } else {
                    self.document.add_term(&unstemmed, wdf_inc)?;
                }
            }

            if self.stem_strategy == StemStrategy::None || self.stemmer.is_none() {
                continue;
            }
            if self.stem_strategy == StemStrategy::Some {
                if stop_strategy == StopStrategy::Stemmed && self.is_stopword(&term)? {
                    continue;
                }
                if !should_stem(&term) {
                    continue;
                }
            }

            let stem = self.stemmer.stem_word(&term)?;
            if stem.is_empty() {
                continue;
            }
            let marker = if self.stem_strategy == StemStrategy::All { "" } else { "Z" };
            let stemmed = format!("{marker}{prefix}{stem}");
            if self.stem_strategy != StemStrategy::Some && positions {
                self.termpos += 1;
                self.document.add_posting(&stemmed, self.termpos, wdf_inc)?;
            } else {
                self.document.add_term(&stemmed, wdf_inc)?;
            }
        }
        log::trace!(
            "indexed text into {} terms, termpos now {}",
            self.document.termlist_count(),
            self.termpos
        );
        Ok(())
    }
}
