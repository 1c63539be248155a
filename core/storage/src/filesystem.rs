//! Server filesystem storage tier.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::BlobBackend;
use sealvault_common::{BlobKind, Error, Result, Tier};

/// Extension of every blob file.
const BLOB_EXTENSION: &str = "blob";

/// Filesystem storage backend.
///
/// Stores one file per blob under a dedicated directory. Ids are generated
/// names of the form `<kind>_<uuid>`.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a blob id to its file, refusing anything that could escape the root.
    fn blob_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid blob id: {:?}", id)));
        }
        Ok(self.root.join(format!("{}.{}", id, BLOB_EXTENSION)))
    }

    /// Errors on reads and deletes. A missing file is a missing blob.
    fn map_read_io(&self, id: &str, err: std::io::Error) -> Error {
        match err.kind() {
            ErrorKind::NotFound => Error::NotFound(format!("Blob file not found: {}", id)),
            _ => Self::unreachable(err),
        }
    }

    /// Errors on writes. A missing path here means the root is gone.
    fn map_write_io(&self, id: &str, err: std::io::Error) -> Error {
        match err.kind() {
            ErrorKind::StorageFull => {
                Error::QuotaExceeded(format!("Filesystem full while writing {}", id))
            }
            _ => Self::unreachable(err),
        }
    }

    /// Write through a sibling temp file and rename into place.
    ///
    /// The temp file is removed again if the rename fails.
    async fn write_atomic(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(id)?;
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, data)
            .await
            .map_err(|e| self.map_write_io(id, e))?;

        if let Err(e) = fs::rename(&temp_path, &path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(
                    path = %temp_path.display(),
                    error = %cleanup,
                    "Failed to remove temp blob"
                );
            }
            return Err(self.map_write_io(id, e));
        }
        Ok(())
    }

    fn unreachable(err: std::io::Error) -> Error {
        Error::TierUnreachable {
            tier: Tier::Filesystem,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl BlobBackend for FilesystemBackend {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn tier(&self) -> Tier {
        Tier::Filesystem
    }

    async fn put(&self, data: &[u8], kind: BlobKind) -> Result<String> {
        let id = format!("{}_{}", kind, Uuid::new_v4().simple());
        self.write_atomic(&id, data).await?;

        debug!(id = %id, size = data.len(), "Wrote blob file");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(id)?;
        fs::read(&path).await.map_err(|e| self.map_read_io(id, e))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.blob_path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| self.map_read_io(id, e))
    }

    async fn health_check(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get() {
        let temp = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(temp.path()).unwrap();
        let data = b"sealed bytes".to_vec();

        let id = backend.put(&data, BlobKind::Vault).await.unwrap();

        assert!(id.starts_with("vault_"));
        assert!(temp.path().join(format!("{}.blob", id)).exists());
        assert_eq!(backend.get(&id).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(temp.path()).unwrap();

        assert!(matches!(
            backend.get("vault_missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(temp.path().join("blobs")).unwrap();

        for id in ["../escape", "a/b", "", "..", "x.blob"] {
            assert!(
                matches!(backend.get(id).await, Err(Error::InvalidInput(_))),
                "id {:?} should be rejected",
                id
            );
        }
    }

    #[tokio::test]
    async fn test_creates_root_and_reports_health() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("blobs");
        let backend = FilesystemBackend::new(&root).unwrap();

        assert!(root.is_dir());
        assert!(backend.health_check().await);

        std::fs::remove_dir_all(&root).unwrap();
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_unreachable() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("blobs");
        let backend = FilesystemBackend::new(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        // A regular file where the directory used to be.
        std::fs::write(&root, b"").unwrap();

        let err = backend.put(b"data", BlobKind::Vault).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TierUnreachable { tier: Tier::Filesystem, .. }
        ));
    }

    #[tokio::test]
    async fn test_put_after_root_removed_is_unreachable() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("blobs");
        let backend = FilesystemBackend::new(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let err = backend.put(b"data", BlobKind::Vault).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TierUnreachable { tier: Tier::Filesystem, .. }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(temp.path()).unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let target = temp.path().join("vault_fixed.blob");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupant"), b"").unwrap();

        let err = backend
            .write_atomic("vault_fixed", b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TierUnreachable { .. }));
        assert!(!temp.path().join("vault_fixed.tmp").exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(temp.path()).unwrap();
        let id = backend.put(b"x", BlobKind::Registry).await.unwrap();

        backend.delete(&id).await.unwrap();
        assert!(matches!(backend.get(&id).await, Err(Error::NotFound(_))));
    }
}
