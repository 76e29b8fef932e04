//! JSON manifest for the save-everything call.
//!
//! File paths are resolved against the manifest's own directory. A file
//! that cannot be read becomes an empty upload, which the engine rejects
//! for that item alone.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::Result;
use crate::model::{
    CategoryRef, DocumentId, PaymentId, PaymentUpdate, PermitTypeId, ProcedureId, Section,
    UploadedFile, VoucherInput,
};
use crate::orchestrator::{BatchFile, PermitAssignment, SaveAllRequest};

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub procedure_id: ProcedureId,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub assignments: Vec<ManifestAssignment>,
    #[serde(default)]
    pub vouchers: Vec<ManifestVoucher>,
    #[serde(default)]
    pub payment_updates: Vec<ManifestPaymentUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestFile {
    pub path: PathBuf,
    /// Display name; defaults to the file stem.
    pub name: Option<String>,
    pub permit_type_id: Option<PermitTypeId>,
    pub section: Section,
    pub category: CategoryRef,
}

#[derive(Debug, Deserialize)]
pub struct ManifestAssignment {
    pub permit_type_id: PermitTypeId,
    #[serde(default)]
    pub permit_documents: Vec<DocumentId>,
    #[serde(default)]
    pub photos: Vec<DocumentId>,
    #[serde(default)]
    pub tracking: Vec<DocumentId>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestVoucher {
    pub path: Option<PathBuf>,
    pub amount: Option<String>,
    pub bank: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestPaymentUpdate {
    pub payment_id: PaymentId,
    #[serde(flatten)]
    pub update: PaymentUpdate,
}

impl Manifest {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Read every referenced file and build the request. `base` is the
    /// directory relative paths are resolved against.
    pub async fn into_request(self, base: &Path) -> SaveAllRequest {
        let mut request = SaveAllRequest::new(self.procedure_id);

        for entry in self.files {
            let mut file = read_upload(base, &entry.path).await;
            file.name = entry.name;
            request.files.push(BatchFile {
                file,
                permit_type_id: entry.permit_type_id,
                section: entry.section,
                category: entry.category,
            });
        }

        request.assignments = self
            .assignments
            .into_iter()
            .map(|a| PermitAssignment {
                permit_documents: a.permit_documents,
                photos: a.photos,
                tracking: a.tracking,
                expiry_date: a.expiry_date,
                ..PermitAssignment::new(a.permit_type_id)
            })
            .collect();

        for voucher in self.vouchers {
            let file = match &voucher.path {
                Some(path) => Some(read_upload(base, path).await),
                None => None,
            };
            request.vouchers.push(VoucherInput {
                file,
                amount: voucher.amount,
                bank: voucher.bank,
                date: voucher.date,
            });
        }

        request.payment_updates = self
            .payment_updates
            .into_iter()
            .map(|u| (u.payment_id, u.update))
            .collect();
        request
    }
}

/// Read a file from disk into an upload. Unreadable files come back empty.
pub async fn read_upload(base: &Path, path: &Path) -> UploadedFile {
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let original_filename = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = match tokio::fs::read(&full).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %full.display(), error = %err, "Unreadable file");
            Vec::new()
        }
    };
    UploadedFile::new(original_filename, bytes)
}
