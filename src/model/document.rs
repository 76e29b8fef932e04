use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryId, DocumentId, PermitTypeId, ProcedureId, Section};

/// Metadata of an uploaded artifact. The bytes live in file storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub procedure_id: ProcedureId,
    pub category_id: CategoryId,
    pub permit_type_id: Option<PermitTypeId>,
    pub section: Section,
    pub name: String,
    pub original_filename: String,
    pub extension: String,
    pub size: u64,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// A file handed to the engine by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Declared display name; falls back to the file stem.
    pub name: Option<String>,
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: None,
            original_filename: original_filename.into(),
            bytes,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lowercased extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => Path::new(&self.original_filename)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&self.original_filename)
                .to_string(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() || self.original_filename.trim().is_empty()
    }
}

/// Input for a single document upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub procedure_id: ProcedureId,
    pub category: super::CategoryRef,
    pub permit_type_id: Option<PermitTypeId>,
    pub section: Section,
    pub file: UploadedFile,
}
