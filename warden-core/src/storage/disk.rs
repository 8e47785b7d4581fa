use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::{
    Error,
    error::StorageError,
    id::generate_prefixed_id,
    repositories::{FileStorage, StoredFile, Upload},
};

/// [`FileStorage`] writing uploads below a root directory
///
/// Stored files are addressed by their path relative to the root, and
/// served from `{public_base_url}/{id}`.
#[derive(Debug, Clone)]
pub struct DiskFileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl DiskFileStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier to a path, refusing anything that escapes the root.
    fn resolve(&self, id: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(id);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || id.is_empty() {
            return Err(StorageError::MalformedId(format!("file id: {id}")).into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for DiskFileStorage {
    async fn store(&self, upload: Upload, folder: &str) -> Result<StoredFile, Error> {
        let id = format!(
            "{folder}/{}.{}",
            generate_prefixed_id("file"),
            upload.extension()
        );
        let path = self.resolve(&id)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Database(format!("create upload dir: {e}")))?;
        }
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| StorageError::Database(format!("write upload: {e}")))?;

        tracing::debug!(file_id = %id, bytes = upload.bytes.len(), "Stored upload");

        Ok(StoredFile {
            url: format!("{}/{id}", self.public_base_url),
            id,
        })
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        let path = self.resolve(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Database(format!("remove upload: {e}")).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(generate_prefixed_id("warden-disk-test"))
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let root = scratch_dir();
        let storage = DiskFileStorage::new(&root, "/uploads/");

        let stored = storage
            .store(Upload::new(b"png-bytes".to_vec(), "image/png"), "avatars")
            .await
            .unwrap();

        assert!(stored.url.starts_with("/uploads/avatars/file_"));
        let on_disk = tokio::fs::read(root.join(&stored.id)).await.unwrap();
        assert_eq!(on_disk, b"png-bytes");

        storage.remove(&stored.id).await.unwrap();
        assert!(!root.join(&stored.id).exists());

        // already gone
        storage.remove(&stored.id).await.unwrap();

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let storage = DiskFileStorage::new(scratch_dir(), "/uploads");

        assert!(matches!(
            storage.remove("../etc/passwd").await,
            Err(Error::Storage(StorageError::MalformedId(_)))
        ));
        assert!(storage.remove("/etc/passwd").await.is_err());
    }
}
