use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{FileStorage, StorageError, sanitize_filename};

/// In-process store keyed by path. Can be switched into a failing mode to
/// exercise storage-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    counter: AtomicU64,
    fail_writes: AtomicBool,
    fail_names: Mutex<Vec<String>>,
    pinned: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` and `delete` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `store` fail only for files with this suggested name.
    pub fn fail_on(&self, suggested_name: &str) {
        self.fail_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(suggested_name.to_string());
    }

    /// Make `delete` fail for one stored path.
    pub fn pin(&self, path: &str) {
        self.pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn rejects(&self, suggested_name: &str) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
            || self
                .fail_names
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|n| n == suggested_name)
    }
}

impl FileStorage for MemoryStorage {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        if self.rejects(suggested_name) {
            return Err(StorageError::Rejected(format!(
                "write refused for {suggested_name}"
            )));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = format!("mem/{n}_{}", sanitize_filename(suggested_name));
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.contains(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let pinned = self
            .pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p == path);
        if pinned || self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected(format!("delete refused for {path}")));
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }

    fn url_for(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_mode_rejects_writes() {
        let storage = MemoryStorage::new();
        let path = storage.store(b"a", "a.pdf").await.unwrap();
        assert!(storage.contains(&path));

        storage.fail_writes(true);
        assert!(storage.store(b"b", "b.pdf").await.is_err());
        assert!(storage.delete(&path).await.is_err());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn fail_on_targets_one_name() {
        let storage = MemoryStorage::new();
        storage.fail_on("bad.pdf");
        assert!(storage.store(b"x", "bad.pdf").await.is_err());
        assert!(storage.store(b"x", "good.pdf").await.is_ok());
    }

    #[tokio::test]
    async fn pinned_paths_survive_delete() {
        let storage = MemoryStorage::new();
        let kept = storage.store(b"a", "a.pdf").await.unwrap();
        let gone = storage.store(b"b", "b.pdf").await.unwrap();
        storage.pin(&kept);
        assert!(storage.delete(&kept).await.is_err());
        storage.delete(&gone).await.unwrap();
        assert_eq!(storage.len(), 1);
    }
}
