//! The `quarry.json` manifest naming the current snapshot.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{QuarryError, Result};

pub(crate) const MANIFEST_FILE: &str = "quarry.json";
pub(crate) const MANIFEST_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub format: u32,
    pub uuid: Uuid,
    pub revision: u64,
    /// Snapshot file name relative to the database directory.
    pub snapshot: String,
}

impl Manifest {
    pub fn snapshot_name(revision: u64) -> String {
        format!("snapshot-{revision:08}.qdb")
    }

    pub fn read(dir: &Path) -> Result<Manifest> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            QuarryError::database_opening(format!(
                "Couldn't read manifest {}: {e}",
                path.display()
            ))
        })?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            QuarryError::database_opening(format!("Bad manifest {}: {e}", path.display()))
        })?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(QuarryError::database_opening(format!(
                "Unsupported manifest format {}",
                manifest.format
            )));
        }
        Ok(manifest)
    }

    /// Atomically replace the manifest in `dir`.
    pub fn write(&self, dir: &Path, sync: bool) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        if sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(dir.join(MANIFEST_FILE))
            .map_err(|e| QuarryError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest {
            format: MANIFEST_FORMAT,
            uuid: Uuid::new_v4(),
            revision: 12,
            snapshot: Manifest::snapshot_name(12),
        };
        manifest.write(dir.path(), false).unwrap();
        assert_eq!(Manifest::read(dir.path()).unwrap(), manifest);
        assert_eq!(manifest.snapshot, "snapshot-00000012.qdb");
    }

    #[test]
    fn test_missing_manifest_is_opening_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::read(dir.path()),
            Err(QuarryError::DatabaseOpening(_))
        ));
    }
}
