//! Local file storage for uploaded archives
//!
//! Archives are kept on disk so chapter content can be re-extracted on
//! demand; only the extracted metadata lives in the database. Each book owns
//! exactly one file named after its id, so a re-upload produces a new file
//! alongside a new book record.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Handle to the upload directory, injected through application state
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create the storage handle, making sure the upload directory exists
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Directory the archives live in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an uploaded archive to disk and return its path
    pub async fn store(&self, book_id: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(book_id);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Read a stored archive back into memory
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Remove a stored archive. Used both for book deletion and for cleanup
    /// when extraction fails after the file was written.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, book_id: &str) -> PathBuf {
        self.root.join(format!("{}.epub", book_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_read_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("epub")).await.unwrap();

        let path = storage.store("book-1", b"payload").await.unwrap();
        assert_eq!(storage.read(&path).await.unwrap(), b"payload");

        storage.remove(&path).await.unwrap();
        assert!(storage.read(&path).await.is_err());
        // Removing twice is not an error
        storage.remove(&path).await.unwrap();
    }
}
