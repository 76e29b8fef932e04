use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::{FileStorage, StorageError, sanitize_filename};

/// Stores files under a root directory as `<uuid>_<sanitized name>`.
///
/// Paths handed back are relative to the root, so a data directory can be
/// moved without rewriting metadata.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStorage for LocalFileStorage {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(suggested_name));
        tokio::fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!(path = %name, size = bytes.len(), "File stored");
        Ok(name)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(full).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path, "Stored file already missing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if self.base_url.is_empty() {
            return format!("file://{}", self.root.join(path).display());
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "https://files.example");

        let path = storage.store(b"pdf bytes", "Decreto.pdf").await.unwrap();
        assert!(path.ends_with("_Decreto.pdf"));
        assert!(storage.exists(&path).await.unwrap());
        assert_eq!(
            std::fs::read(dir.path().join(&path)).unwrap(),
            b"pdf bytes".to_vec()
        );

        storage.delete(&path).await.unwrap();
        assert!(!storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "");
        storage.delete("never-stored.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn paths_outside_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "");
        let err = storage.delete("../outside.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn url_joins_base_and_path() {
        let storage = LocalFileStorage::new("/tmp/x", "https://files.example/");
        assert_eq!(storage.url_for("a.pdf"), "https://files.example/a.pdf");

        let local = LocalFileStorage::new("/srv/files", "");
        assert_eq!(local.url_for("a.pdf"), "file:///srv/files/a.pdf");
    }
}
