use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Read-only view of a photo catalog database.
///
/// Only the file table is touched: its `baseName` column gives the stems of
/// every image the catalog references, which is what scopes preview
/// generation to images a downstream dataset will actually use.
pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Open an existing catalog without ever writing to it
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        tracing::debug!(catalog = %path.display(), "opened catalog");

        Ok(Catalog {
            conn,
            db_path: path.to_path_buf(),
        })
    }

    /// Get the path to the catalog file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a count of files in the catalog
    pub fn file_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM AgLibraryFile", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Stems (base names without extension) of every catalogued file
    pub fn file_stems(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT baseName FROM AgLibraryFile WHERE baseName IS NOT NULL")?;

        let stem_iter = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut stems = BTreeSet::new();
        for stem in stem_iter {
            let stem = stem?;
            if !stem.is_empty() {
                stems.insert(stem);
            }
        }

        tracing::debug!(catalog = %self.db_path.display(), stems = stems.len(), "read catalog stems");
        Ok(stems)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreviewError;

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("catalog.lrcat");
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE AgLibraryFile (
                id_local    INTEGER PRIMARY KEY,
                baseName    TEXT,
                extension   TEXT,
                folder      INTEGER
            )",
            [],
        )
        .unwrap();
        for (name, ext) in [("DSC_0001", "NEF"), ("DSC_0002", "NEF"), ("IMG_7", "CR3"), ("DSC_0001", "JPG")] {
            conn.execute(
                "INSERT INTO AgLibraryFile (baseName, extension, folder) VALUES (?1, ?2, 1)",
                rusqlite::params![name, ext],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO AgLibraryFile (baseName, extension, folder) VALUES (NULL, 'NEF', 1)",
            [],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&fixture(dir.path())).unwrap();
        assert_eq!(catalog.file_count().unwrap(), 5);

        let stems: Vec<String> = catalog.file_stems().unwrap().into_iter().collect();
        assert_eq!(stems, vec!["DSC_0001", "DSC_0002", "IMG_7"]);
    }

    #[test]
    fn test_missing_catalog_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Catalog::open(&dir.path().join("nope.lrcat"));
        assert!(matches!(result, Err(PreviewError::Catalog(_))));
    }

    #[test]
    fn test_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&fixture(dir.path())).unwrap();
        let write = catalog.conn.execute("DELETE FROM AgLibraryFile", []);
        assert!(write.is_err());
    }
}
