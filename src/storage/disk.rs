//! Directory-backed persistence of generations.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};
use memmap2::Mmap;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::storage::manifest::{MANIFEST_FILE, MANIFEST_FORMAT, Manifest};
use crate::storage::{Generation, snapshot};

/// How a writable database treats the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Open an existing database, creating it if absent.
    #[default]
    CreateOrOpen,
    /// Create a new database; fail if one exists.
    Create,
    /// Create a new database, discarding any existing one.
    CreateOrOverwrite,
    /// Open an existing database; fail if absent.
    Open,
}

/// Write buffer size for snapshot files.
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Name of the lock file a writer holds in the database directory.
const LOCK_FILE: &str = "quarry.lock";

/// An exclusive lock on a database directory, held by its one writer.
///
/// Released when dropped.
#[derive(Debug)]
pub(crate) struct WriterLock {
    file: File,
}

impl WriterLock {
    fn acquire(dir: &Path) -> Result<WriterLock> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                QuarryError::database_lock(format!(
                    "Couldn't open lock file '{}': {e}",
                    path.display()
                ))
            })?;
        FileExt::try_lock_exclusive(&file).map_err(|_| {
            QuarryError::database_lock(format!(
                "Unable to get write lock on '{}': already locked",
                dir.display()
            ))
        })?;
        debug!("locked {} for writing", dir.display());
        Ok(WriterLock { file })
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("couldn't release write lock: {e}");
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Open an existing database for reading.
    pub fn open(dir: &Path) -> Result<(DiskStore, Generation)> {
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(QuarryError::database_opening(format!(
                "Couldn't detect type of database at '{}'",
                dir.display()
            )));
        }
        let store = DiskStore {
            dir: dir.to_path_buf(),
        };
        let generation = store.load()?;
        Ok((store, generation))
    }

    /// Open or create a database for writing according to `mode`.
    ///
    /// The returned [`WriterLock`] keeps other writers out of the directory
    /// until it is dropped.
    pub fn open_writable(
        dir: &Path,
        mode: OpenMode,
        sync: bool,
    ) -> Result<(DiskStore, Generation, WriterLock)> {
        if mode == OpenMode::Open && !dir.join(MANIFEST_FILE).is_file() {
            return Err(QuarryError::database_opening(format!(
                "No database at '{}'",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            fs::create_dir(dir).map_err(|e| {
                QuarryError::database_create(format!(
                    "Couldn't create directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }
        let lock = WriterLock::acquire(dir)?;

        let exists = dir.join(MANIFEST_FILE).is_file();
        match (mode, exists) {
            (OpenMode::Open, false) => {
                return Err(QuarryError::database_opening(format!(
                    "No database at '{}'",
                    dir.display()
                )));
            }
            (OpenMode::Create, true) => {
                return Err(QuarryError::database_create(format!(
                    "Can't create new database at '{}': a database already exists and I was told not to overwrite it",
                    dir.display()
                )));
            }
            (OpenMode::Open | OpenMode::CreateOrOpen, true) => {
                let (store, generation) = Self::open(dir)?;
                return Ok((store, generation, lock));
            }
            _ => {}
        }

        let store = DiskStore {
            dir: dir.to_path_buf(),
        };
        let generation = Generation::new(Uuid::new_v4());
        store.store(&generation, sync)?;
        debug!("created database at {}", dir.display());
        Ok((store, generation, lock))
    }

    /// Load the revision the manifest currently names.
    pub fn load(&self) -> Result<Generation> {
        let manifest = Manifest::read(&self.dir)?;
        match self.load_snapshot(&manifest) {
            Err(QuarryError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                // A writer replaced the snapshot between reading the manifest
                // and opening the file.
                let latest = Manifest::read(&self.dir)?;
                if latest == manifest {
                    return Err(QuarryError::database_opening(format!(
                        "Snapshot {} is missing",
                        manifest.snapshot
                    )));
                }
                self.load_snapshot(&latest)
            }
            other => other,
        }
    }

    /// Current revision on disk, without loading the snapshot.
    pub fn revision(&self) -> Result<u64> {
        Ok(Manifest::read(&self.dir)?.revision)
    }

    fn load_snapshot(&self, manifest: &Manifest) -> Result<Generation> {
        let path = self.dir.join(&manifest.snapshot);
        let file = File::open(&path)?;
        // SAFETY: snapshots are persisted by rename and never modified in place.
        let mmap = unsafe { Mmap::map(&file)? };
        let generation = snapshot::decode(&mmap)?;
        if generation.revision != manifest.revision || generation.uuid != manifest.uuid {
            return Err(QuarryError::corrupt(format!(
                "snapshot {} does not match manifest",
                manifest.snapshot
            )));
        }
        debug!(
            "loaded revision {} of {} ({} documents)",
            generation.revision,
            self.dir.display(),
            generation.doc_count()
        );
        Ok(generation)
    }

    /// Persist `generation` and make it the current revision.
    pub fn store(&self, generation: &Generation, sync: bool) -> Result<()> {
        self.store_with_block_size(generation, sync, DEFAULT_BLOCK_SIZE)
    }

    /// As [`store`](Self::store), writing the snapshot in `block_size`
    /// chunks.
    pub fn store_with_block_size(&self, generation: &Generation, sync: bool, block_size: usize) -> Result<()> {
        let bytes = snapshot::encode(generation)?;
        let name = Manifest::snapshot_name(generation.revision);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::with_capacity(block_size, tmp.as_file_mut());
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        if sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(self.dir.join(&name))
            .map_err(|e| QuarryError::Io(e.error))?;

        let manifest = Manifest {
            format: MANIFEST_FORMAT,
            uuid: generation.uuid,
            revision: generation.revision,
            snapshot: name.clone(),
        };
        manifest.write(&self.dir, sync)?;
        self.remove_stale_snapshots(&name);
        Ok(())
    }

    fn remove_stale_snapshots(&self, current: &str) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("couldn't list {}: {e}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("snapshot-") && name.ends_with(".qdb") && name != current {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("couldn't remove stale snapshot {name}: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_modes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("db");

        assert!(matches!(
            DiskStore::open_writable(&dir, OpenMode::Open, false),
            Err(QuarryError::DatabaseOpening(_))
        ));
        let (_, created, lock) = DiskStore::open_writable(&dir, OpenMode::Create, false).unwrap();
        drop(lock);
        assert!(matches!(
            DiskStore::open_writable(&dir, OpenMode::Create, false),
            Err(QuarryError::DatabaseCreate(_))
        ));
        let (_, reopened, lock) =
            DiskStore::open_writable(&dir, OpenMode::CreateOrOpen, false).unwrap();
        assert_eq!(reopened.uuid, created.uuid);
        drop(lock);
        let (_, overwritten, _lock) =
            DiskStore::open_writable(&dir, OpenMode::CreateOrOverwrite, false).unwrap();
        assert_ne!(overwritten.uuid, created.uuid);
    }

    #[test]
    fn test_missing_parent_is_create_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("no").join("such");
        assert!(matches!(
            DiskStore::open_writable(&dir, OpenMode::CreateOrOpen, false),
            Err(QuarryError::DatabaseCreate(_))
        ));
    }

    #[test]
    fn test_store_replaces_snapshot() {
        let tmp = TempDir::new().unwrap();
        let (store, mut generation, _lock) =
            DiskStore::open_writable(tmp.path(), OpenMode::CreateOrOpen, false).unwrap();
        generation.revision = 1;
        generation.metadata.insert(b"k".to_vec(), b"v".to_vec());
        store.store(&generation, true).unwrap();

        let snapshots: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".qdb"))
            .collect();
        assert_eq!(snapshots.len(), 1);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.metadata.get(b"k".as_slice()), Some(&b"v".to_vec()));
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let tmp = TempDir::new().unwrap();
        let (_, _, lock) =
            DiskStore::open_writable(tmp.path(), OpenMode::CreateOrOpen, false).unwrap();
        assert!(matches!(
            DiskStore::open_writable(tmp.path(), OpenMode::CreateOrOpen, false),
            Err(QuarryError::DatabaseLock(_))
        ));
        // Readers are not affected.
        assert!(DiskStore::open(tmp.path()).is_ok());

        drop(lock);
        assert!(DiskStore::open_writable(tmp.path(), OpenMode::Open, false).is_ok());
    }
}
