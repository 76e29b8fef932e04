use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::Engine;
use super::tables::Tables;
use crate::directory::Directory;
use crate::error::Result;
use crate::model::{
    Category, Document, PermitType, PermitTypeId, Procedure, ProcedureId, Receipt, Section,
    ServicePayment, VerificationStatus,
};
use crate::state_machine::PermitAssociation;
use crate::storage::FileStorage;

/// A document with its resolved download URL.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub url: String,
}

/// Everything filed under one attached permit type.
#[derive(Debug, Clone, Serialize)]
pub struct PermitView {
    pub permit_type: PermitType,
    #[serde(flatten)]
    pub association: PermitAssociation,
    pub categories: Vec<Category>,
    pub documents: Vec<DocumentView>,
    pub photos: Vec<DocumentView>,
    pub tracking: Vec<DocumentView>,
}

/// A voucher and its payment record. Vouchers without a record show up as
/// an implicit `PENDING`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub document: DocumentView,
    pub payment: Option<ServicePayment>,
    pub verification: VerificationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureOverview {
    #[serde(flatten)]
    pub procedure: Procedure,
    pub shipment_code: Option<String>,
    pub client_name: Option<String>,
    pub entity_name: Option<String>,
    pub permits: Vec<PermitView>,
    pub payments: Vec<PaymentView>,
    pub receipts: Vec<Receipt>,
}

/// One line of the procedure listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureSummary {
    pub id: ProcedureId,
    pub shipment_ref: String,
    pub shipment_code: Option<String>,
    pub client_name: Option<String>,
    pub status: crate::state_machine::PermitStatus,
    pub total_price: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub permit_count: usize,
    pub document_count: usize,
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    fn view(&self, document: &Document) -> DocumentView {
        DocumentView {
            url: self.storage.url_for(&document.path),
            document: document.clone(),
        }
    }

    fn permit_view(&self, tables: &Tables, association: &PermitAssociation) -> Result<PermitView> {
        let (procedure_id, permit_type_id) = association.key();
        let in_section = |section: Section| -> Vec<DocumentView> {
            tables
                .documents_of(procedure_id)
                .filter(|d| d.section == section && d.permit_type_id == Some(permit_type_id))
                .map(|d| self.view(d))
                .collect()
        };
        Ok(PermitView {
            permit_type: tables.permit_type(permit_type_id)?.clone(),
            association: association.clone(),
            categories: tables
                .categories
                .values()
                .filter(|c| {
                    c.procedure_id == procedure_id && c.permit_type_id == Some(permit_type_id)
                })
                .cloned()
                .collect(),
            documents: in_section(Section::PermitDocuments),
            photos: in_section(Section::Photos),
            tracking: in_section(Section::Tracking),
        })
    }

    /// Full breakdown of one procedure: a view per attached permit type, the
    /// shared payment section and the fee receipts.
    pub fn list_procedure(&self, id: ProcedureId) -> Result<ProcedureOverview> {
        let tables = self.lock();
        let procedure = tables.procedure(id)?.clone();

        let permits = tables
            .associations_of(id)
            .map(|a| self.permit_view(&tables, a))
            .collect::<Result<Vec<_>>>()?;

        let payments = tables
            .documents_of(id)
            .filter(|d| d.section == Section::ServicePayment)
            .map(|d| {
                let payment = tables.payment_for_document(d.id).cloned();
                PaymentView {
                    verification: payment
                        .as_ref()
                        .map(|p| p.verification)
                        .unwrap_or_default(),
                    payment,
                    document: self.view(d),
                }
            })
            .collect();

        let receipts = tables
            .receipts
            .values()
            .filter(|r| r.procedure_id == id)
            .cloned()
            .collect();

        Ok(ProcedureOverview {
            shipment_code: self.directory.shipment_code(&procedure.shipment_ref),
            client_name: self.directory.client_name(&procedure.client_ref),
            entity_name: self.directory.entity_name(&procedure.entity_ref),
            procedure,
            permits,
            payments,
            receipts,
        })
    }

    pub fn list_procedures(&self) -> Vec<ProcedureSummary> {
        let tables = self.lock();
        tables
            .procedures
            .values()
            .map(|p| ProcedureSummary {
                id: p.id,
                shipment_ref: p.shipment_ref.clone(),
                shipment_code: self.directory.shipment_code(&p.shipment_ref),
                client_name: self.directory.client_name(&p.client_ref),
                status: p.status,
                total_price: p.total_price,
                expiry_date: p.milestones.expiry_date,
                permit_count: tables.associations_of(p.id).count(),
                document_count: tables.documents_of(p.id).count(),
            })
            .collect()
    }

    /// Documents of a procedure, optionally narrowed to a section and a
    /// permit type.
    pub fn list_documents(
        &self,
        procedure_id: ProcedureId,
        section: Option<Section>,
        permit_type_id: Option<PermitTypeId>,
    ) -> Result<Vec<Document>> {
        let tables = self.lock();
        tables.procedure(procedure_id)?;
        Ok(tables
            .documents_of(procedure_id)
            .filter(|d| section.is_none_or(|s| d.section == s))
            .filter(|d| permit_type_id.is_none_or(|p| d.permit_type_id == Some(p)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::super::test_support::*;
    use super::super::FixedClock;
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::error::EngineError;
    use crate::model::{CategoryRef, NewDocument, NewProcedure, UploadedFile, VoucherInput};
    use crate::storage::MemoryStorage;

    async fn file(
        engine: &Engine<MemoryStorage>,
        procedure: ProcedureId,
        permit: Option<PermitTypeId>,
        section: Section,
        category: &str,
    ) -> Document {
        engine
            .create_document(NewDocument {
                procedure_id: procedure,
                category: CategoryRef::New(category.into()),
                permit_type_id: permit,
                section,
                file: UploadedFile::new("scan.pdf", vec![7]),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn overview_splits_documents_per_permit_and_section() {
        let engine = engine();
        let (procedure, permits) = procedure_with(&engine, &["Sanitario", "Fitosanitario"]);
        file(&engine, procedure, Some(permits[0]), Section::PermitDocuments, "Facturas").await;
        file(&engine, procedure, Some(permits[0]), Section::Photos, "Fotos").await;
        file(&engine, procedure, Some(permits[1]), Section::Tracking, "Expediente o CPB").await;
        let voucher =
            file(&engine, procedure, None, Section::ServicePayment, "Pago de Servicio").await;

        let overview = engine.list_procedure(procedure).unwrap();
        assert_eq!(overview.permits.len(), 2);
        let sanitary = &overview.permits[0];
        assert_eq!(sanitary.permit_type.name, "Sanitario");
        assert_eq!(sanitary.documents.len(), 1);
        assert_eq!(sanitary.photos.len(), 1);
        assert!(sanitary.tracking.is_empty());
        assert_eq!(overview.permits[1].tracking.len(), 1);

        assert_eq!(overview.payments.len(), 1);
        let payment = &overview.payments[0];
        assert_eq!(payment.document.document.id, voucher.id);
        assert!(payment.payment.is_none());
        assert_eq!(payment.verification, VerificationStatus::Pending);
        assert!(payment.document.url.starts_with("memory://"));
    }

    #[tokio::test]
    async fn overview_includes_recorded_payments() {
        let engine = engine();
        let (procedure, _) = procedure_with(&engine, &["Sanitario"]);
        engine
            .ingest_vouchers(
                procedure,
                vec![VoucherInput {
                    file: Some(UploadedFile::new("v.pdf", vec![1])),
                    amount: Some("150.00".into()),
                    ..Default::default()
                }],
            )
            .await;
        let overview = engine.list_procedure(procedure).unwrap();
        assert!(overview.payments[0].payment.is_some());
    }

    #[test]
    fn listings_are_decorated_from_the_directory() {
        let directory = StaticDirectory {
            shipments: HashMap::from([("C-9".to_string(), "CARGA-009".to_string())]),
            clients: HashMap::from([("CL-1".to_string(), "Importadora Sur".to_string())]),
            entities: HashMap::new(),
        };
        let engine = Engine::new(MemoryStorage::new(), directory)
            .with_clock(Arc::new(FixedClock(day(2024, 3, 1))));
        let procedure = engine
            .create_procedure(NewProcedure {
                shipment_ref: "C-9".into(),
                client_ref: "CL-1".into(),
                entity_ref: "SAG".into(),
                ..Default::default()
            })
            .unwrap();

        let overview = engine.list_procedure(procedure.id).unwrap();
        assert_eq!(overview.shipment_code.as_deref(), Some("CARGA-009"));
        assert_eq!(overview.client_name.as_deref(), Some("Importadora Sur"));
        assert_eq!(overview.entity_name, None);

        let summaries = engine.list_procedures();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].shipment_code.as_deref(), Some("CARGA-009"));
    }

    #[tokio::test]
    async fn document_listing_filters() {
        let engine = engine();
        let (procedure, permits) = procedure_with(&engine, &["Sanitario", "Fitosanitario"]);
        file(&engine, procedure, Some(permits[0]), Section::Photos, "Fotos").await;
        file(&engine, procedure, Some(permits[1]), Section::Photos, "Fotos").await;
        file(&engine, procedure, Some(permits[1]), Section::PermitDocuments, "Facturas").await;

        let all = engine.list_documents(procedure, None, None).unwrap();
        assert_eq!(all.len(), 3);
        let photos = engine.list_documents(procedure, Some(Section::Photos), None).unwrap();
        assert_eq!(photos.len(), 2);
        let narrowed = engine
            .list_documents(procedure, Some(Section::Photos), Some(permits[1]))
            .unwrap();
        assert_eq!(narrowed.len(), 1);
    }

    #[test]
    fn unknown_procedure_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.list_procedure(ProcedureId(77)),
            Err(EngineError::NotFound { .. })
        ));
    }
}
