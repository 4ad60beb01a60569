//! The single writer of a database.

use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::database::{CommittedCell, Database, DatabaseConfig, check_metadata_key};
use crate::document::Document;
use crate::error::{QuarryError, Result};
use crate::storage::disk::WriterLock;
use crate::storage::{DiskStore, Generation, OpenMode};
use crate::DocId;

struct Transaction {
    saved: Arc<Generation>,
    saved_modified: bool,
    flushed: bool,
}

struct WriterState {
    store: Option<DiskStore>,
    lock: Option<WriterLock>,
    config: DatabaseConfig,
    committed: CommittedCell,
    modified: bool,
    transaction: Option<Transaction>,
    closed: bool,
}

/// A database open for writing.
///
/// Dereferences to a [`Database`] reading the writer's working generation,
/// including changes not yet committed.
pub struct WritableDatabase {
    db: Database,
    state: Mutex<WriterState>,
}

impl WritableDatabase {
    /// Open or create a database in `path` with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<WritableDatabase> {
        Self::open_with_config(path, mode, DatabaseConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        config: DatabaseConfig,
    ) -> Result<WritableDatabase> {
        let path = path.as_ref();
        let (store, generation, lock) =
            DiskStore::open_writable(path, mode, config.sync_on_commit)?;
        info!(
            "opened {} for writing at revision {} ({} documents)",
            path.display(),
            generation.revision,
            generation.doc_count()
        );
        Ok(Self::from_generation(Some((store, lock)), generation, config))
    }

    /// A writable database held entirely in memory.
    pub fn inmemory() -> WritableDatabase {
        Self::from_generation(None, Generation::new(Uuid::new_v4()), DatabaseConfig::default())
    }

    fn from_generation(
        disk: Option<(DiskStore, WriterLock)>,
        generation: Generation,
        config: DatabaseConfig,
    ) -> WritableDatabase {
        let generation = Arc::new(generation);
        let (store, lock) = disk.unzip();
        WritableDatabase {
            db: Database::for_writer(Arc::clone(&generation)),
            state: Mutex::new(WriterState {
                store,
                lock,
                config,
                committed: Arc::new(RwLock::new(generation)),
                modified: false,
                transaction: None,
                closed: false,
            }),
        }
    }

    /// A read handle on the latest committed revision. It follows later
    /// commits through [`Database::reopen`].
    pub fn reader(&self) -> Result<Database> {
        let state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        Ok(Database::shared_reader(Arc::clone(&state.committed)))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Generation) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        let result = self.db.modify(f)?;
        state.modified = true;
        Ok(result)
    }

    // ── Documents ───────────────────────────────────────────────────

    /// Add `doc` under the next unused docid and return that docid.
    pub fn add_document(&self, doc: Document) -> Result<DocId> {
        let content = Arc::clone(doc.content());
        self.mutate(move |generation| {
            let docid = generation
                .last_docid
                .checked_add(1)
                .ok_or_else(|| QuarryError::database("Run out of docids"))?;
            generation.put_document(docid, content);
            Ok(docid)
        })
    }

    /// Store `doc` under `docid`, replacing whatever was there.
    pub fn replace_document(&self, docid: DocId, doc: Document) -> Result<()> {
        check_docid(docid)?;
        let content = Arc::clone(doc.content());
        self.mutate(move |generation| {
            generation.put_document(docid, content);
            Ok(())
        })
    }

    pub fn delete_document(&self, docid: DocId) -> Result<()> {
        check_docid(docid)?;
        self.mutate(|generation| {
            if generation.remove_document(docid) {
                Ok(())
            } else {
                Err(QuarryError::DocNotFound(docid))
            }
        })
    }

    /// Replace the first document indexed by `unique_term` and delete any
    /// others; add `doc` if none match. Returns the docid used.
    pub fn replace_document_by_term<T: AsRef<[u8]>>(
        &self,
        unique_term: T,
        doc: Document,
    ) -> Result<DocId> {
        let term = unique_term.as_ref();
        if term.is_empty() {
            return Err(QuarryError::invalid_argument("Empty termnames aren't allowed."));
        }
        let content = Arc::clone(doc.content());
        self.mutate(move |generation| {
            let docids: Vec<DocId> = generation
                .postings
                .get(term)
                .map(|list| list.entries.iter().map(|e| e.docid).collect())
                .unwrap_or_default();
            match docids.split_first() {
                Some((&first, rest)) => {
                    for &docid in rest {
                        generation.remove_document(docid);
                    }
                    generation.put_document(first, content);
                    Ok(first)
                }
                None => {
                    let docid = generation
                        .last_docid
                        .checked_add(1)
                        .ok_or_else(|| QuarryError::database("Run out of docids"))?;
                    generation.put_document(docid, content);
                    Ok(docid)
                }
            }
        })
    }

    /// Delete every document indexed by `term`.
    pub fn delete_document_by_term<T: AsRef<[u8]>>(&self, term: T) -> Result<()> {
        let term = term.as_ref();
        self.mutate(|generation| {
            let docids: Vec<DocId> = generation
                .postings
                .get(term)
                .map(|list| list.entries.iter().map(|e| e.docid).collect())
                .unwrap_or_default();
            for docid in docids {
                generation.remove_document(docid);
            }
            Ok(())
        })
    }

    // ── Metadata, synonyms, spellings ───────────────────────────────

    /// Set user metadata. An empty value removes the key.
    pub fn set_metadata<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> Result<()> {
        let key = key.as_ref();
        let value = value.as_ref();
        check_metadata_key(key)?;
        self.mutate(|generation| {
            if value.is_empty() {
                generation.metadata.remove(key);
            } else {
                generation.metadata.insert(key.to_vec(), value.to_vec());
            }
            Ok(())
        })
    }

    pub fn add_synonym<T: AsRef<[u8]>, S: AsRef<[u8]>>(&self, term: T, synonym: S) -> Result<()> {
        let (term, synonym) = (term.as_ref(), synonym.as_ref());
        self.mutate(|generation| {
            generation
                .synonyms
                .entry(term.to_vec())
                .or_default()
                .insert(synonym.to_vec());
            Ok(())
        })
    }

    pub fn remove_synonym<T: AsRef<[u8]>, S: AsRef<[u8]>>(&self, term: T, synonym: S) -> Result<()> {
        let (term, synonym) = (term.as_ref(), synonym.as_ref());
        self.mutate(|generation| {
            let now_empty = match generation.synonyms.get_mut(term) {
                Some(set) => {
                    set.remove(synonym);
                    set.is_empty()
                }
                None => false,
            };
            if now_empty {
                generation.synonyms.remove(term);
            }
            Ok(())
        })
    }

    pub fn clear_synonyms<T: AsRef<[u8]>>(&self, term: T) -> Result<()> {
        let term = term.as_ref();
        self.mutate(|generation| {
            generation.synonyms.remove(term);
            Ok(())
        })
    }

    pub fn add_spelling<W: AsRef<[u8]>>(&self, word: W, freq_inc: u32) -> Result<()> {
        let word = word.as_ref();
        self.mutate(|generation| {
            let freq = generation.spellings.entry(word.to_vec()).or_insert(0);
            *freq = freq.saturating_add(freq_inc);
            Ok(())
        })
    }

    /// Reduce the frequency of `word`, dropping it at zero. Returns the
    /// amount the frequency could not be reduced by.
    pub fn remove_spelling<W: AsRef<[u8]>>(&self, word: W, freq_dec: u32) -> Result<u32> {
        let word = word.as_ref();
        self.mutate(|generation| {
            let Some(freq) = generation.spellings.get_mut(word) else {
                return Ok(freq_dec);
            };
            if *freq > freq_dec {
                *freq -= freq_dec;
                Ok(0)
            } else {
                let shortfall = freq_dec - *freq;
                generation.spellings.remove(word);
                Ok(shortfall)
            }
        })
    }

    // ── Commit and transactions ─────────────────────────────────────

    /// Publish pending changes. A commit with nothing pending does nothing.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        if state.transaction.is_some() {
            return Err(QuarryError::invalid_operation(
                "Can't commit during a transaction",
            ));
        }
        self.commit_locked(&mut state)
    }

    /// Alias for [`commit`](Self::commit).
    pub fn flush(&self) -> Result<()> {
        self.commit()
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<()> {
        if !state.modified {
            return Ok(());
        }
        let revision = self.db.modify(|generation| {
            generation.revision += 1;
            Ok(generation.revision)
        })?;
        let generation = self.db.generation()?;
        if let Some(store) = &state.store {
            if let Err(e) = store.store(&generation, state.config.sync_on_commit) {
                // Roll back the revision bump so a retry reuses it.
                self.db.modify(|generation| {
                    generation.revision -= 1;
                    Ok(())
                })?;
                return Err(e);
            }
        }
        *state.committed.write() = generation;
        state.modified = false;
        debug!("committed revision {revision}");
        Ok(())
    }

    /// Start a transaction. With `flushed` the pending changes are
    /// committed first and the transaction commits when it ends.
    pub fn begin_transaction(&self, flushed: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        if state.transaction.is_some() {
            return Err(QuarryError::invalid_operation(
                "Cannot begin transaction - transaction already in progress",
            ));
        }
        if flushed {
            self.commit_locked(&mut state)?;
        }
        state.transaction = Some(Transaction {
            saved: self.db.generation()?,
            saved_modified: state.modified,
            flushed,
        });
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        let Some(transaction) = state.transaction.take() else {
            return Err(QuarryError::invalid_operation(
                "Cannot commit transaction - no transaction currently in progress",
            ));
        };
        if transaction.flushed {
            self.commit_locked(&mut state)?;
        }
        Ok(())
    }

    /// Discard the changes made since [`begin_transaction`](Self::begin_transaction).
    pub fn cancel_transaction(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QuarryError::closed());
        }
        let Some(transaction) = state.transaction.take() else {
            return Err(QuarryError::invalid_operation(
                "Cannot cancel transaction - no transaction currently in progress",
            ));
        };
        self.db.replace_generation(transaction.saved);
        state.modified = transaction.saved_modified;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().transaction.is_some()
    }

    /// Commit pending changes (or cancel an open transaction) and close.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        let result = if let Some(transaction) = state.transaction.take() {
            self.db.replace_generation(transaction.saved);
            state.modified = transaction.saved_modified;
            Ok(())
        } else {
            self.commit_locked(&mut state)
        };
        state.closed = true;
        state.lock = None;
        self.db.close();
        result
    }
}

impl Deref for WritableDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl Drop for WritableDatabase {
    fn drop(&mut self) {
        if self.db.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("failed to commit on drop: {e}");
        }
    }
}

impl fmt::Debug for WritableDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Writable{}", self.db.get_description())
    }
}

fn check_docid(docid: DocId) -> Result<()> {
    if docid == 0 {
        return Err(QuarryError::invalid_argument("Document ID 0 is invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(terms: &[&str]) -> Document {
        let mut doc = Document::new();
        for (pos, term) in terms.iter().enumerate() {
            doc.add_posting(term, pos as u32 + 1, 1).unwrap();
        }
        doc
    }

    #[test]
    fn test_docids_are_never_reused() {
        let db = WritableDatabase::inmemory();
        assert_eq!(db.add_document(doc(&["a"])).unwrap(), 1);
        assert_eq!(db.add_document(doc(&["b"])).unwrap(), 2);
        db.delete_document(2).unwrap();
        assert_eq!(db.add_document(doc(&["c"])).unwrap(), 3);
        assert_eq!(db.get_lastdocid().unwrap(), 3);
        assert!(matches!(db.delete_document(2), Err(QuarryError::DocNotFound(2))));
    }

    #[test]
    fn test_replace_document_in_gap() {
        let db = WritableDatabase::inmemory();
        db.replace_document(10, doc(&["x"])).unwrap();
        assert_eq!(db.get_lastdocid().unwrap(), 10);
        assert_eq!(db.add_document(doc(&["y"])).unwrap(), 11);
        assert!(db.replace_document(0, doc(&["z"])).is_err());
    }

    #[test]
    fn test_replace_by_term() {
        let db = WritableDatabase::inmemory();
        db.add_document(doc(&["Qkey", "old"])).unwrap();
        db.add_document(doc(&["Qkey", "dup"])).unwrap();
        let docid = db.replace_document_by_term("Qkey", doc(&["Qkey", "new"])).unwrap();
        assert_eq!(docid, 1);
        assert_eq!(db.get_doccount().unwrap(), 1);
        assert_eq!(db.get_termfreq("old").unwrap(), 0);
        assert_eq!(db.get_termfreq("new").unwrap(), 1);
        let added = db.replace_document_by_term("Qother", doc(&["Qother"])).unwrap();
        assert_eq!(added, 3);
        db.delete_document_by_term("Qkey").unwrap();
        assert_eq!(db.get_doccount().unwrap(), 1);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let db = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen).unwrap();
        db.add_document(doc(&["a"])).unwrap();
        db.commit().unwrap();
        let revision = db.get_revision().unwrap();
        db.commit().unwrap();
        db.flush().unwrap();
        assert_eq!(db.get_revision().unwrap(), revision);
    }

    #[test]
    fn test_transactions() {
        let db = WritableDatabase::inmemory();
        db.add_document(doc(&["keep"])).unwrap();
        db.begin_transaction(false).unwrap();
        assert!(db.begin_transaction(false).is_err());
        assert!(db.commit().is_err());
        db.add_document(doc(&["drop"])).unwrap();
        db.cancel_transaction().unwrap();
        assert_eq!(db.get_termfreq("drop").unwrap(), 0);
        assert!(db.commit_transaction().is_err());

        db.begin_transaction(true).unwrap();
        db.add_document(doc(&["more"])).unwrap();
        db.commit_transaction().unwrap();
        let reader = db.reader().unwrap();
        assert_eq!(reader.get_termfreq("more").unwrap(), 1);
    }

    #[test]
    fn test_reader_follows_commits() {
        let db = WritableDatabase::inmemory();
        let reader = db.reader().unwrap();
        db.add_document(doc(&["a"])).unwrap();
        assert_eq!(db.get_doccount().unwrap(), 1);
        assert_eq!(reader.get_doccount().unwrap(), 0);
        assert!(!reader.reopen().unwrap());
        db.commit().unwrap();
        assert!(reader.reopen().unwrap());
        assert_eq!(reader.get_doccount().unwrap(), 1);
    }

    #[test]
    fn test_close_commits_pending_changes() {
        let tmp = TempDir::new().unwrap();
        {
            let db = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen).unwrap();
            db.add_document(doc(&["a"])).unwrap();
            db.close().unwrap();
            assert!(db.add_document(doc(&["b"])).is_err());
            assert!(db.get_doccount().is_err());
        }
        let reader = Database::open(tmp.path()).unwrap();
        assert_eq!(reader.get_doccount().unwrap(), 1);
    }

    #[test]
    fn test_drop_commits() {
        let tmp = TempDir::new().unwrap();
        {
            let db = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen).unwrap();
            db.set_metadata("key", "value").unwrap();
        }
        let reader = Database::open(tmp.path()).unwrap();
        assert_eq!(reader.get_metadata("key").unwrap(), b"value");
    }

    #[test]
    fn test_spelling_and_synonyms() {
        let db = WritableDatabase::inmemory();
        db.add_spelling("hello", 1).unwrap();
        db.add_spelling("mell", 2).unwrap();
        assert_eq!(db.get_spelling_suggestion("hell", 2).unwrap(), b"mell");
        assert_eq!(db.remove_spelling("mell", 5).unwrap(), 3);
        assert_eq!(db.get_spelling_suggestion("hell", 2).unwrap(), b"hello");

        db.add_synonym("color", "colour").unwrap();
        db.add_synonym("color", "hue").unwrap();
        let synonyms: Vec<Vec<u8>> = db.synonyms("color").unwrap().map(|t| t.into_term()).collect();
        assert_eq!(synonyms, vec![b"colour".to_vec(), b"hue".to_vec()]);
        db.remove_synonym("color", "hue").unwrap();
        db.clear_synonyms("color").unwrap();
        assert_eq!(db.synonym_keys("").unwrap().count(), 0);
    }

    #[test]
    fn test_metadata() {
        let db = WritableDatabase::inmemory();
        assert!(db.set_metadata("", "x").is_err());
        db.set_metadata("a", "1").unwrap();
        db.set_metadata("b", "2").unwrap();
        db.set_metadata("a", "").unwrap();
        let keys: Vec<Vec<u8>> = db.metadata_keys("").unwrap().map(|t| t.into_term()).collect();
        assert_eq!(keys, vec![b"b".to_vec()]);
        assert_eq!(db.get_metadata("a").unwrap(), b"");
    }
}
