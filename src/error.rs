use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Coarse classification used in batch reports and CLI exit messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Storage(_) | EngineError::Io(_) | EngineError::Json(_) => {
                ErrorKind::Storage
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// Malformed input or a broken domain invariant.
    Validation,
    /// The file store or snapshot file rejected a read or write.
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Validation => write!(f, "ValidationError"),
            ErrorKind::Storage => write!(f, "StorageFailure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = EngineError::not_found("procedure", 42);
        assert_eq!(err.to_string(), "procedure not found: 42");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn storage_errors_classify_as_storage_failure() {
        let err = EngineError::from(StorageError::Rejected("disk full".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.kind().to_string(), "StorageFailure");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
