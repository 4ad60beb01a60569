//! Database handles.
//!
//! A [`Database`] is a cheap, cloneable read handle pinned to one
//! [`Generation`]. It only sees later commits after [`Database::reopen`].
//! [`WritableDatabase`] dereferences to the `Database` view of its working
//! generation, so a writer always reads its own uncommitted changes.
//!
//! ```text
//! WritableDatabase ── working Arc<Generation> ──► commit ──► DiskStore
//!        │                                            │
//!        └── committed cell ◄─────────────────────────┘
//!                 ▲
//!   Database::reopen (reader())      Database::open(path) ─► reads manifest
//! ```

mod spelling;
mod writable;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::error::{QuarryError, Result};
use crate::iterator::{PositionIterator, PostingIterator, TermIterator, ValueIterator};
use crate::storage::{DiskStore, Generation};
use crate::{DocCount, DocId, TermCount, ValueNo};

pub use writable::WritableDatabase;

/// Settings for opening a writable database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// fsync snapshot and manifest on every commit.
    pub sync_on_commit: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            sync_on_commit: true,
        }
    }
}

impl DatabaseConfig {
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

/// Latest committed generation of an in-process writer.
pub(crate) type CommittedCell = Arc<RwLock<Arc<Generation>>>;

enum Origin {
    /// Opened from a directory; reopen reads the manifest.
    Disk(DiskStore),
    /// Reader of an in-process writer; reopen reads the committed cell.
    Shared(CommittedCell),
    /// The working view of a writer.
    Writer,
    /// A fixed generation handed to callbacks during a match.
    Snapshot,
}

struct Handle {
    generation: Option<Arc<Generation>>,
    origin: Origin,
}

/// A read handle on a database snapshot.
#[derive(Clone)]
pub struct Database {
    handle: Arc<RwLock<Handle>>,
}

impl Database {
    /// Open the database in `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Database> {
        let (store, generation) = DiskStore::open(path.as_ref())?;
        log::debug!(
            "opened {} at revision {}",
            path.as_ref().display(),
            generation.revision
        );
        Ok(Database::from_parts(Arc::new(generation), Origin::Disk(store)))
    }

    fn from_parts(generation: Arc<Generation>, origin: Origin) -> Database {
        Database {
            handle: Arc::new(RwLock::new(Handle {
                generation: Some(generation),
                origin,
            })),
        }
    }

    pub(crate) fn for_writer(generation: Arc<Generation>) -> Database {
        Database::from_parts(generation, Origin::Writer)
    }

    pub(crate) fn snapshot(generation: Arc<Generation>) -> Database {
        Database::from_parts(generation, Origin::Snapshot)
    }

    pub(crate) fn shared_reader(cell: CommittedCell) -> Database {
        let generation = Arc::clone(&cell.read());
        Database::from_parts(generation, Origin::Shared(cell))
    }

    /// The pinned generation, or the closed error.
    pub(crate) fn generation(&self) -> Result<Arc<Generation>> {
        self.handle
            .read()
            .generation
            .clone()
            .ok_or_else(QuarryError::closed)
    }

    /// Run `f` on the writer's working generation, cloning it first if a
    /// reader still shares it.
    pub(crate) fn modify<R>(&self, f: impl FnOnce(&mut Generation) -> Result<R>) -> Result<R> {
        let mut handle = self.handle.write();
        let generation = handle.generation.as_mut().ok_or_else(QuarryError::closed)?;
        f(Arc::make_mut(generation))
    }

    pub(crate) fn replace_generation(&self, generation: Arc<Generation>) {
        self.handle.write().generation = Some(generation);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.handle.read().generation.is_none()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Move to the latest committed revision. Returns true if it changed.
    pub fn reopen(&self) -> Result<bool> {
        let mut handle = self.handle.write();
        let current = handle.generation.clone().ok_or_else(QuarryError::closed)?;
        let latest = match &handle.origin {
            Origin::Disk(store) => {
                if store.revision()? == current.revision {
                    return Ok(false);
                }
                Arc::new(store.load()?)
            }
            Origin::Shared(cell) => Arc::clone(&cell.read()),
            Origin::Writer | Origin::Snapshot => return Ok(false),
        };
        if latest.revision == current.revision && latest.uuid == current.uuid {
            return Ok(false);
        }
        log::debug!("reopened at revision {}", latest.revision);
        handle.generation = Some(latest);
        Ok(true)
    }

    /// Release the snapshot. Every later call fails with
    /// "Database has been closed". Closing twice is harmless.
    pub fn close(&self) {
        self.handle.write().generation = None;
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub fn get_uuid(&self) -> Result<Uuid> {
        Ok(self.generation()?.uuid)
    }

    pub fn get_revision(&self) -> Result<u64> {
        Ok(self.generation()?.revision)
    }

    pub fn get_doccount(&self) -> Result<DocCount> {
        Ok(self.generation()?.doc_count())
    }

    pub fn get_lastdocid(&self) -> Result<DocId> {
        Ok(self.generation()?.last_docid)
    }

    pub fn get_avlength(&self) -> Result<f64> {
        Ok(self.generation()?.avlength())
    }

    pub fn get_total_length(&self) -> Result<u64> {
        Ok(self.generation()?.total_length)
    }

    pub fn get_termfreq<T: AsRef<[u8]>>(&self, term: T) -> Result<DocCount> {
        Ok(self.generation()?.termfreq(term.as_ref()))
    }

    pub fn get_collection_freq<T: AsRef<[u8]>>(&self, term: T) -> Result<u64> {
        Ok(self.generation()?.collection_freq(term.as_ref()))
    }

    pub fn term_exists<T: AsRef<[u8]>>(&self, term: T) -> Result<bool> {
        Ok(self.generation()?.term_exists(term.as_ref()))
    }

    pub fn has_positions(&self) -> Result<bool> {
        Ok(self.generation()?.has_positions())
    }

    pub fn get_value_freq(&self, slot: ValueNo) -> Result<DocCount> {
        Ok(self.generation()?.value_stats(slot).freq)
    }

    pub fn get_value_lower_bound(&self, slot: ValueNo) -> Result<Vec<u8>> {
        Ok(self.generation()?.value_stats(slot).lower_bound)
    }

    pub fn get_value_upper_bound(&self, slot: ValueNo) -> Result<Vec<u8>> {
        Ok(self.generation()?.value_stats(slot).upper_bound)
    }

    pub fn get_doclength_lower_bound(&self) -> Result<u64> {
        Ok(self.generation()?.doclen_lower)
    }

    pub fn get_doclength_upper_bound(&self) -> Result<u64> {
        Ok(self.generation()?.doclen_upper)
    }

    pub fn get_wdf_upper_bound<T: AsRef<[u8]>>(&self, term: T) -> Result<TermCount> {
        let generation = self.generation()?;
        Ok(generation
            .postings
            .get(term.as_ref())
            .map_or(0, |list| list.wdf_upper))
    }

    pub fn get_doclength(&self, docid: DocId) -> Result<u64> {
        self.generation()?.doclength(docid)
    }

    // ── Documents and lists ─────────────────────────────────────────

    pub fn get_document(&self, docid: DocId) -> Result<Document> {
        let generation = self.generation()?;
        let content = Arc::clone(&generation.doc(docid)?.content);
        Ok(Document::from_stored(docid, content, generation))
    }

    /// Postings for `term`; the empty term iterates every document.
    pub fn postlist<T: AsRef<[u8]>>(&self, term: T) -> Result<PostingIterator> {
        Ok(PostingIterator::new(self.generation()?, term.as_ref()))
    }

    pub fn termlist(&self, docid: DocId) -> Result<TermIterator> {
        let generation = self.generation()?;
        let content = Arc::clone(&generation.doc(docid)?.content);
        Ok(TermIterator::for_document(content, Some(generation)))
    }

    pub fn positionlist<T: AsRef<[u8]>>(&self, docid: DocId, term: T) -> Result<PositionIterator> {
        let generation = self.generation()?;
        let positions = generation
            .doc(docid)?
            .content
            .terms
            .get(term.as_ref())
            .map(|entry| entry.positions.clone())
            .unwrap_or_default();
        Ok(PositionIterator::new(positions))
    }

    /// Terms starting with `prefix`, ascending.
    pub fn allterms<T: AsRef<[u8]>>(&self, prefix: T) -> Result<TermIterator> {
        Ok(TermIterator::all_terms(self.generation()?, prefix.as_ref()))
    }

    pub fn valuestream(&self, slot: ValueNo) -> Result<ValueIterator> {
        Ok(ValueIterator::new(self.generation()?.value_stream(slot)))
    }

    // ── Metadata, synonyms, spellings ───────────────────────────────

    /// User metadata for `key`, empty if unset.
    pub fn get_metadata<K: AsRef<[u8]>>(&self, key: K) -> Result<Vec<u8>> {
        let key = key.as_ref();
        check_metadata_key(key)?;
        Ok(self
            .generation()?
            .metadata
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    pub fn metadata_keys<P: AsRef<[u8]>>(&self, prefix: P) -> Result<TermIterator> {
        let prefix = prefix.as_ref();
        let generation = self.generation()?;
        let keys = generation
            .metadata
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(TermIterator::plain(keys))
    }

    pub fn synonyms<T: AsRef<[u8]>>(&self, term: T) -> Result<TermIterator> {
        let generation = self.generation()?;
        let synonyms = generation
            .synonyms
            .get(term.as_ref())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(TermIterator::plain(synonyms))
    }

    pub fn synonym_keys<P: AsRef<[u8]>>(&self, prefix: P) -> Result<TermIterator> {
        let prefix = prefix.as_ref();
        let generation = self.generation()?;
        let keys = generation
            .synonyms
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(TermIterator::plain(keys))
    }

    /// Spelling dictionary words with their frequencies as termfreq.
    pub fn spellings(&self) -> Result<TermIterator> {
        let generation = self.generation()?;
        let rows = generation
            .spellings
            .iter()
            .map(|(word, freq)| (word.clone(), u64::from(*freq)))
            .collect();
        Ok(TermIterator::with_frequencies(rows))
    }

    /// Best correction for `word` from the spelling dictionary, or empty.
    pub fn get_spelling_suggestion<W: AsRef<[u8]>>(
        &self,
        word: W,
        max_edit_distance: u32,
    ) -> Result<Vec<u8>> {
        let generation = self.generation()?;
        Ok(spelling::suggest(&generation.spellings, word.as_ref(), max_edit_distance))
    }

    pub fn get_description(&self) -> String {
        let handle = self.handle.read();
        let location = match &handle.origin {
            Origin::Disk(store) => store.path().display().to_string(),
            Origin::Shared(_) => "reader".to_string(),
            Origin::Writer => "writer".to_string(),
            Origin::Snapshot => "snapshot".to_string(),
        };
        match &handle.generation {
            Some(generation) => format!(
                "Database({location}, revision={}, doccount={})",
                generation.revision,
                generation.doc_count()
            ),
            None => format!("Database({location}, closed)"),
        }
    }

    /// Verify the database in `path`: checksums are validated while
    /// loading, then the postings are cross-checked against documents.
    pub fn check<P: AsRef<Path>>(path: P) -> Result<CheckReport> {
        let (_, generation) = DiskStore::open(path.as_ref())?;
        Ok(CheckReport {
            revision: generation.revision,
            doccount: generation.doc_count(),
            terms: generation.postings.len() as u64,
            errors: generation.consistency_errors(),
        })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

/// Outcome of [`Database::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub revision: u64,
    pub doccount: DocCount,
    pub terms: u64,
    pub errors: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub(crate) fn check_metadata_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(QuarryError::invalid_argument("Empty metadata keys are invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OpenMode;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_path() {
        let tmp = TempDir::new().unwrap();
        let err = Database::open(tmp.path().join("nothing")).unwrap_err();
        assert!(matches!(err, QuarryError::DatabaseOpening(_)));
    }

    #[test]
    fn test_reader_pins_snapshot_until_reopen() {
        let tmp = TempDir::new().unwrap();
        let writer = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen).unwrap();
        let mut doc = Document::new();
        doc.add_term("hello", 1).unwrap();
        writer.add_document(doc.clone()).unwrap();
        writer.commit().unwrap();

        let reader = Database::open(tmp.path()).unwrap();
        assert_eq!(reader.get_doccount().unwrap(), 1);

        writer.add_document(doc).unwrap();
        writer.commit().unwrap();
        assert_eq!(reader.get_doccount().unwrap(), 1);
        assert!(reader.reopen().unwrap());
        assert_eq!(reader.get_doccount().unwrap(), 2);
        assert!(!reader.reopen().unwrap());
        assert_eq!(reader.get_uuid().unwrap(), writer.get_uuid().unwrap());
    }

    #[test]
    fn test_closed_database() {
        let db = WritableDatabase::inmemory().reader().unwrap();
        db.close();
        let err = db.get_doccount().unwrap_err();
        assert_eq!(err.to_string(), "Database error: Database has been closed");
        db.close();
        assert!(db.get_description().contains("closed"));
    }

    #[test]
    fn test_metadata_key_must_not_be_empty() {
        let db = WritableDatabase::inmemory();
        assert!(matches!(
            db.get_metadata(""),
            Err(QuarryError::InvalidArgument(_))
        ));
    }
}
