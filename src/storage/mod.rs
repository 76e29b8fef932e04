//! File storage seam.
//!
//! The engine never touches bytes on disk directly; it hands them to a
//! [`FileStorage`] and keeps only the returned path. [`LocalFileStorage`]
//! writes under a root directory, [`MemoryStorage`] keeps everything in a
//! map and can be told to fail, which is what the engine tests use.

mod local;
mod memory;

pub use local::LocalFileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store refused the operation.
    #[error("storage rejected the operation: {0}")]
    Rejected(String),

    /// A path handed back to the store is not one it issued.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store bytes, check for them, delete them, and turn a path into a URL.
#[allow(async_fn_in_trait)]
pub trait FileStorage {
    /// Persist `bytes`, returning the path to keep in metadata.
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Remove a stored object. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    fn url_for(&self, path: &str) -> String;
}

/// Reduce a client-supplied filename to something safe to embed in a path.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\Decreto 12.pdf"), "Decreto_12.pdf");
        assert_eq!(sanitize_filename(".."), "file");
    }
}
