//! The engine's record tables and the lookups shared by every operation.
//!
//! `Tables` is also the snapshot format: it serializes as-is to
//! `state.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::{
    Category, CategoryId, Document, DocumentId, PaymentId, PermitType, PermitTypeId, Procedure,
    ProcedureId, Receipt, ReceiptId, Sequence, ServicePayment,
};
use crate::state_machine::PermitAssociation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sequences {
    pub procedure: Sequence,
    pub permit_type: Sequence,
    pub category: Sequence,
    pub document: Sequence,
    pub payment: Sequence,
    pub receipt: Sequence,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub sequences: Sequences,
    #[serde(default)]
    pub procedures: BTreeMap<ProcedureId, Procedure>,
    #[serde(default)]
    pub permit_types: BTreeMap<PermitTypeId, PermitType>,
    /// Kept in attach order; the first entry per procedure is its "first"
    /// permit type.
    #[serde(default)]
    pub associations: Vec<PermitAssociation>,
    #[serde(default)]
    pub categories: BTreeMap<CategoryId, Category>,
    #[serde(default)]
    pub documents: BTreeMap<DocumentId, Document>,
    #[serde(default)]
    pub payments: BTreeMap<PaymentId, ServicePayment>,
    #[serde(default)]
    pub receipts: BTreeMap<ReceiptId, Receipt>,
}

impl Tables {
    pub fn procedure(&self, id: ProcedureId) -> Result<&Procedure> {
        self.procedures
            .get(&id)
            .ok_or_else(|| EngineError::not_found("procedure", id))
    }

    pub fn procedure_mut(&mut self, id: ProcedureId) -> Result<&mut Procedure> {
        self.procedures
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("procedure", id))
    }

    pub fn permit_type(&self, id: PermitTypeId) -> Result<&PermitType> {
        self.permit_types
            .get(&id)
            .ok_or_else(|| EngineError::not_found("permit type", id))
    }

    pub fn association(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
    ) -> Option<&PermitAssociation> {
        self.associations
            .iter()
            .find(|a| a.key() == (procedure_id, permit_type_id))
    }

    pub fn association_mut(
        &mut self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
    ) -> Result<&mut PermitAssociation> {
        self.associations
            .iter_mut()
            .find(|a| a.key() == (procedure_id, permit_type_id))
            .ok_or_else(|| {
                EngineError::not_found(
                    "permit association",
                    format!("{procedure_id}/{permit_type_id}"),
                )
            })
    }

    /// Domain check: the permit type must be attached to the procedure.
    pub fn require_attached(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
    ) -> Result<()> {
        if self.association(procedure_id, permit_type_id).is_some() {
            Ok(())
        } else {
            Err(EngineError::validation(format!(
                "permit type {permit_type_id} is not attached to procedure {procedure_id}"
            )))
        }
    }

    pub fn associations_of(
        &self,
        procedure_id: ProcedureId,
    ) -> impl Iterator<Item = &PermitAssociation> {
        self.associations
            .iter()
            .filter(move |a| a.procedure_id == procedure_id)
    }

    pub fn first_permit_type(&self, procedure_id: ProcedureId) -> Option<PermitTypeId> {
        self.associations_of(procedure_id)
            .next()
            .map(|a| a.permit_type_id)
    }

    pub fn category(&self, id: CategoryId) -> Result<&Category> {
        self.categories
            .get(&id)
            .ok_or_else(|| EngineError::not_found("category", id))
    }

    pub fn document(&self, id: DocumentId) -> Result<&Document> {
        self.documents
            .get(&id)
            .ok_or_else(|| EngineError::not_found("document", id))
    }

    pub fn documents_of(&self, procedure_id: ProcedureId) -> impl Iterator<Item = &Document> {
        self.documents
            .values()
            .filter(move |d| d.procedure_id == procedure_id)
    }

    pub fn payment_for_document(&self, document_id: DocumentId) -> Option<&ServicePayment> {
        self.payments
            .values()
            .find(|p| p.document_id == document_id)
    }

    pub fn receipt(&self, id: ReceiptId) -> Result<&Receipt> {
        self.receipts
            .get(&id)
            .ok_or_else(|| EngineError::not_found("receipt", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::PermitStatus;

    #[test]
    fn first_permit_type_follows_attach_order() {
        let mut tables = Tables::default();
        tables.associations.push(PermitAssociation::new(
            ProcedureId(1),
            PermitTypeId(9),
            None,
            PermitStatus::Pending,
        ));
        tables.associations.push(PermitAssociation::new(
            ProcedureId(1),
            PermitTypeId(2),
            None,
            PermitStatus::Pending,
        ));
        assert_eq!(tables.first_permit_type(ProcedureId(1)), Some(PermitTypeId(9)));
        assert_eq!(tables.first_permit_type(ProcedureId(2)), None);
    }

    #[test]
    fn unattached_permit_is_a_validation_error() {
        let tables = Tables::default();
        let err = tables
            .require_attached(ProcedureId(1), PermitTypeId(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn empty_tables_roundtrip_through_json() {
        let json = serde_json::to_string(&Tables::default()).unwrap();
        let back: Tables = serde_json::from_str(&json).unwrap();
        assert!(back.procedures.is_empty());
        let partial: Tables = serde_json::from_str("{}").unwrap();
        assert!(partial.documents.is_empty());
    }
}
