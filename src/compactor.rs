//! Merging several databases into one new, compact database.
//!
//! Sources are loaded in parallel, their documents renumbered (or checked
//! for disjoint docid ranges) and written into a fresh destination. Progress
//! is reported once per table, always in this order:
//!
//! ```text
//! postlist  docdata  termlist  position  value  spelling  synonym  metadata
//! ```
//!
//! Spelling frequencies from different sources are summed and synonym sets
//! are unioned. A metadata key present in more than one source is settled by
//! the [`MetadataResolver`], which keeps the first source's value unless
//! replaced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentContent;
use crate::error::{QuarryError, Result};
use crate::storage::{DiskStore, Generation, OpenMode};
use crate::DocId;

/// Table names in the order [`Compactor::compact`] reports them.
pub const TABLES: [&str; 8] = [
    "postlist", "docdata", "termlist", "position", "value", "spelling", "synonym", "metadata",
];

const MIN_BLOCK_SIZE: usize = 2048;
const MAX_BLOCK_SIZE: usize = 65536;

// ── Configuration ─────────────────────────────────────────────────────

/// Settings for a [`Compactor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactorConfig {
    /// Write buffer size of the destination snapshot. Must be a power of two
    /// from 2048 to 65536; anything else falls back to 8192.
    pub block_size: usize,
    /// Give the merged documents consecutive docids starting at 1.
    pub renumber: bool,
    /// Merge the sources pairwise over several passes instead of at once.
    pub multipass: bool,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        CompactorConfig {
            block_size: crate::storage::disk::DEFAULT_BLOCK_SIZE,
            renumber: true,
            multipass: false,
        }
    }
}

impl CompactorConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_renumber(mut self, renumber: bool) -> Self {
        self.renumber = renumber;
        self
    }

    pub fn with_multipass(mut self, multipass: bool) -> Self {
        self.multipass = multipass;
        self
    }

    fn effective_block_size(&self) -> usize {
        let size = self.block_size;
        if size.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) {
            size
        } else {
            warn!(
                "block size {size} is not a power of two between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}, using {}",
                crate::storage::disk::DEFAULT_BLOCK_SIZE
            );
            crate::storage::disk::DEFAULT_BLOCK_SIZE
        }
    }
}

// ── Callbacks ─────────────────────────────────────────────────────────

/// Chooses the value of a metadata key set in more than one source.
///
/// `values` holds one value per source defining the key, in source order.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, key: &[u8], values: &[Vec<u8>]) -> Result<Vec<u8>>;
}

impl<F> MetadataResolver for F
where
    F: Fn(&[u8], &[Vec<u8>]) -> Result<Vec<u8>> + Send + Sync,
{
    fn resolve(&self, key: &[u8], values: &[Vec<u8>]) -> Result<Vec<u8>> {
        self(key, values)
    }
}

/// Keeps the value from the first source.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstWins;

impl MetadataResolver for FirstWins {
    fn resolve(&self, _key: &[u8], values: &[Vec<u8>]) -> Result<Vec<u8>> {
        Ok(values.first().cloned().unwrap_or_default())
    }
}

type StatusCallback = Box<dyn FnMut(&str, &str) + Send>;

// ── Compactor ─────────────────────────────────────────────────────────

/// Builds a new database from the contents of one or more sources.
///
/// ```no_run
/// use quarry::Compactor;
///
/// let mut compactor = Compactor::new();
/// compactor.add_source("db1").add_source("db2");
/// compactor.set_destdir("merged");
/// compactor.set_status_callback(|table, status| println!("{table}: {status}"));
/// compactor.compact()?;
/// # Ok::<(), quarry::QuarryError>(())
/// ```
pub struct Compactor {
    config: CompactorConfig,
    sources: Vec<PathBuf>,
    destdir: Option<PathBuf>,
    status: Option<StatusCallback>,
    resolver: Arc<dyn MetadataResolver>,
}

impl Default for Compactor {
    fn default() -> Self {
        Self::with_config(CompactorConfig::default())
    }
}

/// Documents of one or more sources, in ascending (new) docid order.
type Part = Vec<(DocId, Arc<DocumentContent>)>;

impl Compactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompactorConfig) -> Self {
        Compactor {
            config,
            sources: Vec::new(),
            destdir: None,
            status: None,
            resolver: Arc::new(FirstWins),
        }
    }

    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    pub fn add_source<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.sources.push(path.as_ref().to_path_buf());
        self
    }

    /// Directory the compacted database is written to. Any database already
    /// there is replaced.
    pub fn set_destdir<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.destdir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn set_renumber(&mut self, renumber: bool) -> &mut Self {
        self.config.renumber = renumber;
        self
    }

    pub fn set_multipass(&mut self, multipass: bool) -> &mut Self {
        self.config.multipass = multipass;
        self
    }

    pub fn set_block_size(&mut self, block_size: usize) -> &mut Self {
        self.config.block_size = block_size;
        self
    }

    /// Called with `(table, status)` as each table is finished.
    pub fn set_status_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        self.status = Some(Box::new(callback));
        self
    }

    pub fn set_metadata_resolver<R: MetadataResolver + 'static>(&mut self, resolver: R) -> &mut Self {
        self.resolver = Arc::new(resolver);
        self
    }

    fn report(&mut self, table: &str, status: String) {
        debug!("compact {table}: {status}");
        if let Some(callback) = self.status.as_mut() {
            callback(table, &status);
        }
    }

    /// Merge the sources into the destination directory.
    pub fn compact(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(QuarryError::invalid_argument("No source databases to compact"));
        }
        let destdir = self
            .destdir
            .clone()
            .ok_or_else(|| QuarryError::invalid_operation("No destination directory set"))?;
        self.check_destination(&destdir)?;
        let block_size = self.config.effective_block_size();

        info!(
            "compacting {} database(s) into {}",
            self.sources.len(),
            destdir.display()
        );

        let sources: Vec<Generation> = self
            .sources
            .par_iter()
            .map(|path| DiskStore::open(path).map(|(_, generation)| generation))
            .collect::<Result<_>>()?;

        let parts = if self.config.renumber {
            renumbered(&sources)
        } else {
            check_disjoint(&sources)?;
            sources
                .iter()
                .map(|source| source.docs.iter().map(|(docid, doc)| (*docid, Arc::clone(&doc.content))).collect())
                .collect()
        };
        let documents = if self.config.multipass {
            merge_multipass(parts)
        } else {
            merge(parts)
        };

        let mut target = Generation::new(Uuid::new_v4());
        for (docid, content) in documents {
            target.put_document(docid, content);
        }
        if !self.config.renumber {
            target.last_docid = sources.iter().map(|s| s.last_docid).max().unwrap_or(0);
        }

        self.report("postlist", count_status(target.postings.len(), "terms"));
        self.report("docdata", count_status(target.docs.len(), "documents"));
        let termlist_entries: usize = target.docs.values().map(|d| d.content.terms.len()).sum();
        self.report("termlist", count_status(termlist_entries, "entries"));
        self.report("position", count_status(target.positional_pairs as usize, "positional entries"));
        self.report("value", count_status(target.values.len(), "slots"));

        for source in &sources {
            for (word, freq) in &source.spellings {
                let total = target.spellings.entry(word.clone()).or_insert(0);
                *total = total.saturating_add(*freq);
            }
        }
        self.report("spelling", count_status(target.spellings.len(), "words"));

        for source in &sources {
            for (term, synonyms) in &source.synonyms {
                target
                    .synonyms
                    .entry(term.clone())
                    .or_default()
                    .extend(synonyms.iter().cloned());
            }
        }
        self.report("synonym", count_status(target.synonyms.len(), "terms"));

        let mut metadata: BTreeMap<&[u8], Vec<Vec<u8>>> = BTreeMap::new();
        for source in &sources {
            for (key, value) in &source.metadata {
                metadata.entry(key.as_slice()).or_default().push(value.clone());
            }
        }
        for (key, mut values) in metadata {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                self.resolver.resolve(key, &values)?
            };
            if !value.is_empty() {
                target.metadata.insert(key.to_vec(), value);
            }
        }
        self.report("metadata", count_status(target.metadata.len(), "keys"));

        target.rebuild_stats();
        target.revision = 1;
        let (store, _, _lock) =
            DiskStore::open_writable(&destdir, OpenMode::CreateOrOverwrite, false)?;
        store.store_with_block_size(&target, true, block_size)?;
        info!(
            "compacted {} documents into {} (last docid {})",
            target.doc_count(),
            destdir.display(),
            target.last_docid
        );
        Ok(())
    }

    fn check_destination(&self, destdir: &Path) -> Result<()> {
        let Ok(dest) = fs::canonicalize(destdir) else {
            // Doesn't exist yet, so it can't be a source.
            return Ok(());
        };
        for source in &self.sources {
            if fs::canonicalize(source).is_ok_and(|source| source == dest) {
                return Err(QuarryError::invalid_argument(format!(
                    "destination may not be the same as any source directory, unless it is a stub database ({})",
                    destdir.display()
                )));
            }
        }
        Ok(())
    }
}

fn count_status(count: usize, what: &str) -> String {
    if count == 0 {
        "Done (table empty)".to_string()
    } else {
        format!("Done ({count} {what})")
    }
}

/// Each source's documents numbered on from the previous source's.
fn renumbered(sources: &[Generation]) -> Vec<Part> {
    let mut next: DocId = 1;
    sources
        .iter()
        .map(|source| {
            let start = next;
            next += source.docs.len() as DocId;
            source
                .docs
                .values()
                .zip(start..)
                .map(|(doc, docid)| (docid, Arc::clone(&doc.content)))
                .collect()
        })
        .collect()
}

fn check_disjoint(sources: &[Generation]) -> Result<()> {
    let mut ranges: Vec<(DocId, DocId)> = sources
        .iter()
        .filter_map(|source| {
            let first = *source.docs.keys().next()?;
            let last = *source.docs.keys().next_back()?;
            Some((first, last))
        })
        .collect();
    ranges.sort_unstable();
    if ranges.windows(2).any(|pair| pair[1].0 <= pair[0].1) {
        return Err(QuarryError::invalid_operation(
            "when merging databases without renumbering, the databases must have disjoint ranges of used document ids",
        ));
    }
    Ok(())
}

fn merge_pair(left: Part, right: Part) -> Part {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.0 <= r.0,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }
    merged
}

/// Merge every part in one pass.
fn merge(parts: Vec<Part>) -> Part {
    let mut merged: Part = parts.into_iter().flatten().collect();
    merged.sort_by_key(|(docid, _)| *docid);
    merged
}

/// Merge parts pairwise, each pass halving their number.
fn merge_multipass(mut parts: Vec<Part>) -> Part {
    let mut pass = 0;
    while parts.len() > 1 {
        pass += 1;
        debug!("compact pass {pass}: merging {} inputs", parts.len());
        parts = parts
            .into_par_iter()
            .chunks(2)
            .map(|pair| pair.into_iter().reduce(merge_pair).unwrap_or_default())
            .collect();
    }
    parts.pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::database::{Database, WritableDatabase};
    use crate::document::Document;

    fn build(dir: &Path, docs: &[(DocId, &str)], meta: &[(&str, &str)]) {
        let db = WritableDatabase::open(dir, OpenMode::Create).unwrap();
        for (docid, term) in docs {
            let mut doc = Document::new();
            doc.add_posting(term, 1, 1).unwrap();
            doc.set_data(term.as_bytes().to_vec());
            doc.add_value(0, term.as_bytes().to_vec());
            db.replace_document(*docid, doc).unwrap();
        }
        for (key, value) in meta {
            db.set_metadata(key, value).unwrap();
        }
        db.add_spelling("hello", 2).unwrap();
        db.add_synonym("hi", term_of(docs)).unwrap();
        db.commit().unwrap();
    }

    fn term_of(docs: &[(DocId, &str)]) -> String {
        docs.first().map(|(_, t)| t.to_string()).unwrap_or_default()
    }

    fn two_sources(first: &[(DocId, &str)], second: &[(DocId, &str)]) -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        build(&a, first, &[("k", "from-a"), ("only-a", "1")]);
        build(&b, second, &[("k", "from-b")]);
        (tmp, a, b)
    }

    #[test]
    fn test_renumber_and_merge_tables() {
        let (tmp, a, b) = two_sources(&[(3, "apple"), (7, "pear")], &[(2, "plum")]);
        let dest = tmp.path().join("out");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let mut compactor = Compactor::new();
        compactor.add_source(&a).add_source(&b).set_destdir(&dest);
        compactor.set_status_callback(move |table, _| recorder.lock().unwrap().push(table.to_string()));
        compactor.compact().unwrap();

        assert_eq!(*seen.lock().unwrap(), TABLES.to_vec());

        let db = Database::open(&dest).unwrap();
        assert_eq!(db.get_doccount().unwrap(), 3);
        assert_eq!(db.get_lastdocid().unwrap(), 3);
        assert_eq!(db.get_document(1).unwrap().get_data(), b"apple");
        assert_eq!(db.get_document(2).unwrap().get_data(), b"pear");
        assert_eq!(db.get_document(3).unwrap().get_data(), b"plum");
        assert_eq!(db.get_value_freq(0).unwrap(), 3);

        assert_eq!(db.get_metadata("k").unwrap(), b"from-a");
        assert_eq!(db.get_metadata("only-a").unwrap(), b"1");

        let spellings: Vec<(Vec<u8>, u64)> = db
            .spellings()
            .unwrap()
            .map(|item| (item.term().to_vec(), item.termfreq().unwrap()))
            .collect();
        assert_eq!(spellings, vec![(b"hello".to_vec(), 4)]);

        let synonyms: Vec<Vec<u8>> = db.synonyms("hi").unwrap().map(|item| item.into_term()).collect();
        assert_eq!(synonyms, vec![b"apple".to_vec(), b"plum".to_vec()]);
    }

    #[test]
    fn test_no_renumber_requires_disjoint_ranges() {
        let (tmp, a, b) = two_sources(&[(1, "apple"), (5, "pear")], &[(3, "plum")]);
        let mut compactor = Compactor::with_config(CompactorConfig::default().with_renumber(false));
        compactor.add_source(&a).add_source(&b).set_destdir(tmp.path().join("out"));
        assert!(matches!(compactor.compact(), Err(QuarryError::InvalidOperation(_))));
    }

    #[test]
    fn test_no_renumber_keeps_docids() {
        let (tmp, a, b) = two_sources(&[(1, "apple"), (2, "pear")], &[(10, "plum")]);
        let dest = tmp.path().join("out");
        let mut compactor = Compactor::new();
        compactor
            .add_source(&a)
            .add_source(&b)
            .set_destdir(&dest)
            .set_renumber(false)
            .set_multipass(true);
        compactor.compact().unwrap();

        let db = Database::open(&dest).unwrap();
        assert_eq!(db.get_lastdocid().unwrap(), 10);
        assert_eq!(db.get_document(10).unwrap().get_data(), b"plum");
        assert_eq!(db.get_termfreq("pear").unwrap(), 1);
    }

    #[test]
    fn test_metadata_resolver() {
        let (tmp, a, b) = two_sources(&[(1, "apple")], &[(1, "plum")]);
        let dest = tmp.path().join("out");
        let mut compactor = Compactor::new();
        compactor.add_source(&a).add_source(&b).set_destdir(&dest);
        compactor.set_metadata_resolver(|_: &[u8], values: &[Vec<u8>]| -> Result<Vec<u8>> { Ok(values.concat()) });
        compactor.compact().unwrap();
        assert_eq!(Database::open(&dest).unwrap().get_metadata("k").unwrap(), b"from-afrom-b");

        compactor.set_metadata_resolver(|_: &[u8], _: &[Vec<u8>]| -> Result<Vec<u8>> {
            Err(QuarryError::callback("refused"))
        });
        assert!(matches!(compactor.compact(), Err(QuarryError::Callback(_))));
    }

    #[test]
    fn test_bad_arguments() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        build(&src, &[(1, "apple")], &[]);

        let mut compactor = Compactor::new();
        compactor.set_destdir(tmp.path().join("out"));
        assert!(matches!(compactor.compact(), Err(QuarryError::InvalidArgument(_))));

        compactor.add_source(&src).set_destdir(&src);
        assert!(matches!(compactor.compact(), Err(QuarryError::InvalidArgument(_))));

        assert_eq!(CompactorConfig::default().with_block_size(1000).effective_block_size(), 8192);
        assert_eq!(CompactorConfig::default().with_block_size(4096).effective_block_size(), 4096);
    }
}
