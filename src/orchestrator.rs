//! The "save everything" call.
//!
//! One request carries new files with their routing, per-permit assignment
//! lists, voucher tuples and payment field updates. The phases run in a
//! fixed order and every item reports its own outcome; nothing is rolled
//! back when a sibling fails.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::directory::Directory;
use crate::engine::{Engine, ItemOutcome, Restamp};
use crate::error::{EngineError, Result};
use crate::model::{
    CategoryRef, Document, DocumentId, NewDocument, PaymentId, PaymentUpdate, PermitDates,
    PermitTypeId, ProcedureId, Section, ServicePayment, UploadedFile, VoucherInput,
};
use crate::state_machine::PermitAssociation;
use crate::storage::FileStorage;

/// One new file and where it goes.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub file: UploadedFile,
    pub permit_type_id: Option<PermitTypeId>,
    pub section: Section,
    pub category: CategoryRef,
}

/// Which documents belong to a permit type, per section, plus an optional
/// new expiry date for its association.
#[derive(Debug, Clone)]
pub struct PermitAssignment {
    pub permit_type_id: PermitTypeId,
    pub permit_documents: Vec<DocumentId>,
    pub photos: Vec<DocumentId>,
    pub tracking: Vec<DocumentId>,
    pub expiry_date: Option<NaiveDate>,
}

impl PermitAssignment {
    pub fn new(permit_type_id: PermitTypeId) -> Self {
        Self {
            permit_type_id,
            permit_documents: Vec::new(),
            photos: Vec::new(),
            tracking: Vec::new(),
            expiry_date: None,
        }
    }

    fn list_mut(&mut self, section: Section) -> Option<&mut Vec<DocumentId>> {
        match section {
            Section::PermitDocuments => Some(&mut self.permit_documents),
            Section::Photos => Some(&mut self.photos),
            Section::Tracking => Some(&mut self.tracking),
            Section::ServicePayment => None,
        }
    }

    /// Deduplicated (section, id) pairs. An id listed under several sections
    /// keeps the first one, in section order.
    fn stamps(&self) -> Vec<(Section, DocumentId)> {
        let mut seen = BTreeSet::new();
        let mut stamps = Vec::new();
        for (section, ids) in [
            (Section::PermitDocuments, &self.permit_documents),
            (Section::Photos, &self.photos),
            (Section::Tracking, &self.tracking),
        ] {
            for id in ids {
                if seen.insert(*id) {
                    stamps.push((section, *id));
                }
            }
        }
        stamps
    }
}

#[derive(Debug, Clone)]
pub struct SaveAllRequest {
    pub procedure_id: ProcedureId,
    pub files: Vec<BatchFile>,
    pub assignments: Vec<PermitAssignment>,
    pub vouchers: Vec<VoucherInput>,
    pub payment_updates: Vec<(PaymentId, PaymentUpdate)>,
}

impl SaveAllRequest {
    pub fn new(procedure_id: ProcedureId) -> Self {
        Self {
            procedure_id,
            files: Vec::new(),
            assignments: Vec::new(),
            vouchers: Vec::new(),
            payment_updates: Vec::new(),
        }
    }
}

/// Phases of a save-everything call, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePhase {
    Validate,
    Files,
    Assignments,
    Vouchers,
    PaymentUpdates,
    Done,
}

/// Result of re-stamping one listed document id.
#[derive(Debug, Clone, Serialize)]
pub struct StampOutcome {
    pub permit_type_id: PermitTypeId,
    pub section: Section,
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub outcome: ItemOutcome<Restamp>,
}

#[derive(Debug, Serialize)]
pub struct SaveAllReport {
    pub procedure_id: ProcedureId,
    pub phases: Vec<SavePhase>,
    pub files: Vec<ItemOutcome<Document>>,
    pub stamps: Vec<StampOutcome>,
    pub expiry_updates: Vec<ItemOutcome<PermitAssociation>>,
    pub vouchers: Vec<ItemOutcome<ServicePayment>>,
    pub payment_updates: Vec<ItemOutcome<ServicePayment>>,
}

impl SaveAllReport {
    fn new(procedure_id: ProcedureId) -> Self {
        Self {
            procedure_id,
            phases: Vec::new(),
            files: Vec::new(),
            stamps: Vec::new(),
            expiry_updates: Vec::new(),
            vouchers: Vec::new(),
            payment_updates: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SavePhase) {
        tracing::debug!(procedure_id = %self.procedure_id, phase = ?phase, "Save phase");
        self.phases.push(phase);
    }

    pub fn failures(&self) -> usize {
        self.files.iter().filter(|o| o.is_failure()).count()
            + self.stamps.iter().filter(|s| s.outcome.is_failure()).count()
            + self.expiry_updates.iter().filter(|o| o.is_failure()).count()
            + self.vouchers.iter().filter(|o| o.is_failure()).count()
            + self.payment_updates.iter().filter(|o| o.is_failure()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }
}

/// Drives a [`SaveAllRequest`] through the engine.
pub struct SaveOrchestrator<'a, S, D> {
    engine: &'a Engine<S, D>,
}

impl<'a, S: FileStorage, D: Directory> SaveOrchestrator<'a, S, D> {
    pub fn new(engine: &'a Engine<S, D>) -> Self {
        Self { engine }
    }

    /// Run every phase and return the per-item report.
    ///
    /// Only a missing procedure aborts the call; every other failure is
    /// recorded against its item.
    pub async fn save_all(&self, request: SaveAllRequest) -> Result<SaveAllReport> {
        let SaveAllRequest {
            procedure_id,
            files,
            assignments,
            vouchers,
            payment_updates,
        } = request;
        let mut report = SaveAllReport::new(procedure_id);

        // VALIDATE: the procedure must exist before anything is written
        report.enter(SavePhase::Validate);
        self.engine.procedure(procedure_id)?;

        let mut assignments: BTreeMap<PermitTypeId, PermitAssignment> =
            assignments.into_iter().fold(BTreeMap::new(), |mut acc, a| {
                merge_assignment(&mut acc, a);
                acc
            });

        // FILES: create each document; the new id joins its permit's list
        report.enter(SavePhase::Files);
        for (index, item) in files.into_iter().enumerate() {
            let result = self
                .engine
                .create_document(NewDocument {
                    procedure_id,
                    category: item.category,
                    permit_type_id: item.permit_type_id,
                    section: item.section,
                    file: item.file,
                })
                .await;
            if let Ok(document) = &result {
                if let Some(permit_type_id) = document.permit_type_id {
                    let assignment = assignments
                        .entry(permit_type_id)
                        .or_insert_with(|| PermitAssignment::new(permit_type_id));
                    if let Some(list) = assignment.list_mut(document.section) {
                        list.push(document.id);
                    }
                }
            }
            report.files.push(ItemOutcome::from_result(index, result));
        }

        // ASSIGNMENTS: re-stamp listed ids, then write expiry dates
        report.enter(SavePhase::Assignments);
        for (index, assignment) in assignments.values().enumerate() {
            let permit_type_id = assignment.permit_type_id;
            for (section, document_id) in assignment.stamps() {
                let stamp_index = report.stamps.len();
                let outcome = self.engine.restamp_document(
                    document_id,
                    procedure_id,
                    section,
                    permit_type_id,
                );
                report.stamps.push(StampOutcome {
                    permit_type_id,
                    section,
                    document_id,
                    outcome: ItemOutcome::from_result(stamp_index, outcome),
                });
            }
            if let Some(expiry) = assignment.expiry_date {
                let result = self.engine.set_permit_dates(
                    procedure_id,
                    permit_type_id,
                    PermitDates {
                        expiry_date: Some(Some(expiry)),
                        ..Default::default()
                    },
                );
                report
                    .expiry_updates
                    .push(ItemOutcome::from_result(index, result));
            }
        }

        // VOUCHERS
        report.enter(SavePhase::Vouchers);
        if !vouchers.is_empty() {
            report.vouchers = self.engine.ingest_vouchers(procedure_id, vouchers).await;
        }

        // PAYMENT_UPDATES
        report.enter(SavePhase::PaymentUpdates);
        for (index, (payment_id, update)) in payment_updates.into_iter().enumerate() {
            let result = self.engine.payment(payment_id).and_then(|payment| {
                if payment.procedure_id == procedure_id {
                    self.engine.update_payment(payment_id, update)
                } else {
                    Err(EngineError::validation(format!(
                        "payment {payment_id} belongs to procedure {}",
                        payment.procedure_id
                    )))
                }
            });
            report
                .payment_updates
                .push(ItemOutcome::from_result(index, result));
        }

        report.enter(SavePhase::Done);
        tracing::info!(
            procedure_id = %procedure_id,
            files = report.files.len(),
            stamps = report.stamps.len(),
            vouchers = report.vouchers.len(),
            failures = report.failures(),
            "Save completed"
        );
        Ok(report)
    }
}

/// Fold a caller-supplied assignment into the per-permit map, so two
/// instructions for the same permit type act as one.
fn merge_assignment(
    map: &mut BTreeMap<PermitTypeId, PermitAssignment>,
    incoming: PermitAssignment,
) {
    let entry = map
        .entry(incoming.permit_type_id)
        .or_insert_with(|| PermitAssignment::new(incoming.permit_type_id));
    entry.permit_documents.extend(incoming.permit_documents);
    entry.photos.extend(incoming.photos);
    entry.tracking.extend(incoming.tracking);
    if incoming.expiry_date.is_some() {
        entry.expiry_date = incoming.expiry_date;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::model::VerificationStatus;
    use crate::state_machine::PermitStatus;
    use rust_decimal::Decimal;

    fn batch_file(permit: PermitTypeId, section: Section, category: &str, name: &str) -> BatchFile {
        BatchFile {
            file: UploadedFile::new(name, b"bytes".to_vec()),
            permit_type_id: Some(permit),
            section,
            category: CategoryRef::New(category.into()),
        }
    }

    #[tokio::test]
    async fn save_all_runs_every_phase_in_order() {
        let engine = engine_on(day(2024, 5, 20));
        let (procedure, permits) = procedure_with(&engine, &["Sanitario"]);
        let orchestrator = SaveOrchestrator::new(&engine);

        let mut request = SaveAllRequest::new(procedure);
        request.files = vec![
            batch_file(
                permits[0],
                Section::PermitDocuments,
                "Documentos para el trámite",
                "factura.pdf",
            ),
            batch_file(permits[0], Section::Tracking, "Expediente o CPB", "cpb.pdf"),
        ];
        request.assignments = vec![PermitAssignment {
            expiry_date: Some(day(2025, 5, 20)),
            ..PermitAssignment::new(permits[0])
        }];
        request.vouchers = vec![VoucherInput {
            file: Some(UploadedFile::new("voucher.pdf", vec![1])),
            amount: Some("150.00".into()),
            bank: None,
            date: None,
        }];

        let report = orchestrator.save_all(request).await.unwrap();
        assert_eq!(
            report.phases,
            vec![
                SavePhase::Validate,
                SavePhase::Files,
                SavePhase::Assignments,
                SavePhase::Vouchers,
                SavePhase::PaymentUpdates,
                SavePhase::Done,
            ]
        );
        assert!(report.is_clean());
        assert_eq!(report.files.len(), 2);
        // Freshly created ids are already stamped correctly.
        assert!(report
            .stamps
            .iter()
            .all(|s| matches!(s.outcome.value(), Some(Restamp::Unchanged))));

        let association = engine.association(procedure, permits[0]).unwrap();
        assert_eq!(association.status, PermitStatus::InProgress);
        assert_eq!(association.milestones.start_date, Some(day(2024, 5, 20)));
        assert_eq!(association.milestones.expiry_date, Some(day(2025, 5, 20)));

        let payment = report.vouchers[0].value().unwrap();
        assert_eq!(payment.verification, VerificationStatus::Pending);
        assert_eq!(payment.payment_date, day(2024, 5, 20));
    }

    #[tokio::test]
    async fn reprocessing_assigned_ids_is_idempotent() {
        let engine = engine();
        let (procedure, permits) = procedure_with(&engine, &["Sanitario", "Fitosanitario"]);
        let orchestrator = SaveOrchestrator::new(&engine);

        let mut first = SaveAllRequest::new(procedure);
        first.files = vec![batch_file(permits[0], Section::Photos, "Fotos", "a.jpg")];
        let report = orchestrator.save_all(first).await.unwrap();
        let photo = report.files[0].value().unwrap().clone();

        // Move the photo to the second permit, listing it twice.
        let mut second = SaveAllRequest::new(procedure);
        second.assignments = vec![PermitAssignment {
            photos: vec![photo.id, photo.id],
            ..PermitAssignment::new(permits[1])
        }];
        let report = orchestrator.save_all(second.clone()).await.unwrap();
        assert_eq!(report.stamps.len(), 1);
        assert!(matches!(
            report.stamps[0].outcome.value(),
            Some(Restamp::Moved { .. })
        ));

        let report = orchestrator.save_all(second).await.unwrap();
        assert!(matches!(
            report.stamps[0].outcome.value(),
            Some(Restamp::Unchanged)
        ));
        assert_eq!(engine.snapshot().documents.len(), 1);
        assert_eq!(
            engine.document(photo.id).unwrap().permit_type_id,
            Some(permits[1])
        );
    }

    #[tokio::test]
    async fn moved_decree_completes_its_new_permit() {
        let engine = engine();
        let (procedure, permits) = procedure_with(&engine, &["Sanitario", "Fitosanitario"]);
        let orchestrator = SaveOrchestrator::new(&engine);

        let mut first = SaveAllRequest::new(procedure);
        first.files = vec![
            batch_file(permits[0], Section::Tracking, "Decreto Resolutivo", "decreto.pdf"),
            batch_file(permits[1], Section::Photos, "Fotos", "foto.jpg"),
        ];
        let report = orchestrator.save_all(first).await.unwrap();
        let decree = report.files[0].value().unwrap().clone();
        let photo = report.files[1].value().unwrap().clone();

        let mut second = SaveAllRequest::new(procedure);
        second.assignments = vec![PermitAssignment {
            tracking: vec![decree.id],
            ..PermitAssignment::new(permits[1])
        }];
        assert!(orchestrator.save_all(second).await.unwrap().is_clean());
        assert_eq!(
            engine.association(procedure, permits[1]).unwrap().status,
            PermitStatus::Completed
        );

        engine.delete_document(photo.id).await.unwrap();
        assert_eq!(
            engine.association(procedure, permits[1]).unwrap().status,
            PermitStatus::Completed
        );
    }

    #[tokio::test]
    async fn failures_are_reported_per_item() {
        let engine = engine();
        let (procedure, permits) = procedure_with(&engine, &["Sanitario"]);
        engine.storage().fail_on("broken.pdf");
        let orchestrator = SaveOrchestrator::new(&engine);

        let mut request = SaveAllRequest::new(procedure);
        request.files = vec![
            batch_file(permits[0], Section::PermitDocuments, "Facturas", "broken.pdf"),
            batch_file(permits[0], Section::PermitDocuments, "Facturas", "ok.pdf"),
        ];
        request.assignments = vec![PermitAssignment {
            tracking: vec![DocumentId(999)],
            ..PermitAssignment::new(permits[0])
        }];
        request.payment_updates = vec![(PaymentId(5), PaymentUpdate::default())];

        let report = orchestrator.save_all(request).await.unwrap();
        assert!(report.files[0].is_failure());
        assert!(report.files[1].value().is_some());
        assert!(report.stamps.iter().any(|s| s.document_id == DocumentId(999)
            && s.outcome.is_failure()));
        assert!(report.payment_updates[0].is_failure());
        assert_eq!(report.failures(), 3);
        assert_eq!(
            engine.association(procedure, permits[0]).unwrap().status,
            PermitStatus::Sd
        );
    }

    #[tokio::test]
    async fn payment_updates_apply_after_vouchers() {
        let engine = engine();
        let (procedure, _) = procedure_with(&engine, &["Sanitario"]);
        let orchestrator = SaveOrchestrator::new(&engine);

        let mut request = SaveAllRequest::new(procedure);
        request.vouchers = vec![VoucherInput {
            file: Some(UploadedFile::new("v.pdf", vec![1])),
            amount: Some("10".into()),
            ..Default::default()
        }];
        let report = orchestrator.save_all(request).await.unwrap();
        let payment_id = report.vouchers[0].value().unwrap().id;

        let mut request = SaveAllRequest::new(procedure);
        request.payment_updates = vec![(
            payment_id,
            PaymentUpdate {
                amount: Some(Decimal::new(1250, 2)),
                ..Default::default()
            },
        )];
        let report = orchestrator.save_all(request).await.unwrap();
        assert_eq!(
            report.payment_updates[0].value().unwrap().amount,
            Decimal::new(1250, 2)
        );
    }

    #[tokio::test]
    async fn missing_procedure_aborts_before_any_write() {
        let engine = engine();
        let orchestrator = SaveOrchestrator::new(&engine);
        let mut request = SaveAllRequest::new(ProcedureId(404));
        request.files = vec![batch_file(PermitTypeId(1), Section::Photos, "Fotos", "a.jpg")];
        let err = orchestrator.save_all(request).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(engine.storage().is_empty());
    }

    #[test]
    fn assignments_for_the_same_permit_merge() {
        let mut map = BTreeMap::new();
        merge_assignment(
            &mut map,
            PermitAssignment {
                photos: vec![DocumentId(1)],
                ..PermitAssignment::new(PermitTypeId(1))
            },
        );
        merge_assignment(
            &mut map,
            PermitAssignment {
                photos: vec![DocumentId(1)],
                tracking: vec![DocumentId(2)],
                expiry_date: Some(day(2025, 1, 1)),
                ..PermitAssignment::new(PermitTypeId(1))
            },
        );
        let merged = &map[&PermitTypeId(1)];
        assert_eq!(
            merged.stamps(),
            vec![
                (Section::Photos, DocumentId(1)),
                (Section::Tracking, DocumentId(2)),
            ]
        );
        assert_eq!(merged.expiry_date, Some(day(2025, 1, 1)));
    }
}
