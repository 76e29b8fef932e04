use std::collections::BTreeSet;

use rust_decimal::Decimal;

use super::Engine;
use super::documents::recompute_status;
use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::model::{
    DocumentId, NewProcedure, PermitAttachment, PermitDates, PermitType, PermitTypeId, Procedure,
    ProcedureId, ProcedureUpdate, ReceiptId, ReceiptKind,
};
use crate::state_machine::{Milestones, PermitAssociation, PermitStatus};
use crate::storage::FileStorage;

#[derive(Debug, Clone, Copy)]
enum FileOwner {
    Document(DocumentId),
    Receipt(ReceiptId),
}

fn require_non_negative(field: &str, value: Option<Decimal>) -> Result<()> {
    match value {
        Some(v) if v.is_sign_negative() => Err(EngineError::validation(format!(
            "{field} must not be negative"
        ))),
        _ => Ok(()),
    }
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    /// Add a permit type to the shared catalog, or return the existing entry
    /// with the same name.
    pub fn register_permit_type(&self, name: &str) -> Result<PermitType> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("permit type name must not be empty"));
        }
        let mut tables = self.lock();
        if let Some(existing) = tables
            .permit_types
            .values()
            .find(|p| p.name.to_lowercase() == name.to_lowercase())
        {
            return Ok(existing.clone());
        }
        let permit = PermitType {
            id: tables.sequences.permit_type.next(),
            name: name.to_string(),
        };
        tables.permit_types.insert(permit.id, permit.clone());
        tracing::info!(permit_type_id = %permit.id, name, "Permit type registered");
        Ok(permit)
    }

    pub fn list_permit_types(&self) -> Vec<PermitType> {
        self.lock().permit_types.values().cloned().collect()
    }

    pub fn create_procedure(&self, input: NewProcedure) -> Result<Procedure> {
        if input.shipment_ref.trim().is_empty() {
            return Err(EngineError::validation("shipment reference is required"));
        }
        if input.client_ref.trim().is_empty() {
            return Err(EngineError::validation("client reference is required"));
        }
        require_non_negative("total price", input.total_price)?;
        require_non_negative("agent fee", input.agent_fee)?;

        let now = self.clock.now();
        let mut tables = self.lock();
        let procedure = Procedure {
            id: tables.sequences.procedure.next(),
            shipment_ref: input.shipment_ref.trim().to_string(),
            client_ref: input.client_ref.trim().to_string(),
            entity_ref: input.entity_ref.trim().to_string(),
            total_price: input.total_price,
            agent_fee: input.agent_fee,
            status: PermitStatus::Pending,
            milestones: Milestones::default(),
            created_at: now,
        };
        tables.procedures.insert(procedure.id, procedure.clone());
        tracing::info!(
            procedure_id = %procedure.id,
            shipment = %procedure.shipment_ref,
            "Procedure opened"
        );
        Ok(procedure)
    }

    pub fn procedure(&self, id: ProcedureId) -> Result<Procedure> {
        self.lock().procedure(id).cloned()
    }

    /// Field-level update. A status written here is a manual override and
    /// skips the monotonic rule.
    pub fn update_procedure(&self, id: ProcedureId, update: ProcedureUpdate) -> Result<Procedure> {
        require_non_negative("total price", update.total_price)?;
        require_non_negative("agent fee", update.agent_fee)?;

        let mut tables = self.lock();
        let procedure = tables.procedure_mut(id)?;
        if let Some(price) = update.total_price {
            procedure.total_price = Some(price);
        }
        if let Some(fee) = update.agent_fee {
            procedure.agent_fee = Some(fee);
        }
        if let Some(status) = update.status {
            procedure.status = status;
        }
        procedure
            .milestones
            .apply_manual(update.start_date, update.end_date, update.expiry_date);
        Ok(procedure.clone())
    }

    /// Delete a procedure and everything it owns.
    ///
    /// Stored files of documents and receipts go first. If the store refuses
    /// one of them, the rows whose files were already removed are dropped,
    /// the procedure and the rest of its rows stay, and the error is returned.
    pub async fn delete_procedure(&self, id: ProcedureId) -> Result<()> {
        let files: Vec<(FileOwner, String)> = {
            let tables = self.lock();
            tables.procedure(id)?;
            tables
                .documents_of(id)
                .map(|d| (FileOwner::Document(d.id), d.path.clone()))
                .chain(
                    tables
                        .receipts
                        .values()
                        .filter(|r| r.procedure_id == id)
                        .map(|r| (FileOwner::Receipt(r.id), r.path.clone())),
                )
                .collect()
        };

        for (done, (_, path)) in files.iter().enumerate() {
            if let Err(err) = self.discard_file(path).await {
                let discarded = &files[..done];
                self.drop_discarded(id, discarded);
                tracing::warn!(
                    procedure_id = %id,
                    removed = discarded.len(),
                    error = %err,
                    "Procedure delete stopped by storage"
                );
                return Err(err);
            }
        }

        let mut tables = self.lock();
        tables.documents.retain(|_, d| d.procedure_id != id);
        tables.receipts.retain(|_, r| r.procedure_id != id);
        tables.payments.retain(|_, p| p.procedure_id != id);
        tables.categories.retain(|_, c| c.procedure_id != id);
        tables.associations.retain(|a| a.procedure_id != id);
        tables.procedures.remove(&id);
        tracing::info!(procedure_id = %id, files = files.len(), "Procedure deleted");
        Ok(())
    }

    fn drop_discarded(&self, procedure_id: ProcedureId, discarded: &[(FileOwner, String)]) {
        let mut tables = self.lock();
        let mut touched = BTreeSet::new();
        for (owner, _) in discarded {
            match owner {
                FileOwner::Document(document_id) => {
                    if let Some(document) = tables.documents.remove(document_id) {
                        touched.extend(document.permit_type_id);
                    }
                    tables.payments.retain(|_, p| p.document_id != *document_id);
                }
                FileOwner::Receipt(receipt_id) => {
                    tables.receipts.remove(receipt_id);
                }
            }
        }
        for permit_type_id in touched {
            recompute_status(&mut tables, procedure_id, permit_type_id);
        }
    }

    /// Attach permit types to a procedure, or update fee/status of ones
    /// already attached, then make sure the default categories exist.
    pub fn attach_permit_types(
        &self,
        procedure_id: ProcedureId,
        attachments: Vec<PermitAttachment>,
    ) -> Result<Vec<PermitAssociation>> {
        for attachment in &attachments {
            require_non_negative("entity fee", attachment.entity_fee)?;
        }
        let attached_ids: Vec<PermitTypeId> = {
            let mut tables = self.lock();
            tables.procedure(procedure_id)?;
            for attachment in &attachments {
                tables.permit_type(attachment.permit_type_id)?;
            }

            for attachment in &attachments {
                let permit_type_id = attachment.permit_type_id;
                match tables.association_mut(procedure_id, permit_type_id) {
                    Ok(existing) => {
                        if attachment.entity_fee.is_some() {
                            existing.entity_fee = attachment.entity_fee;
                        }
                        if let Some(status) = attachment.status {
                            existing.status = status;
                        }
                    }
                    Err(_) => {
                        let status = attachment.status.unwrap_or(self.default_status);
                        tables.associations.push(PermitAssociation::new(
                            procedure_id,
                            permit_type_id,
                            attachment.entity_fee,
                            status,
                        ));
                        tracing::info!(
                            procedure_id = %procedure_id,
                            permit_type_id = %permit_type_id,
                            %status,
                            "Permit type attached"
                        );
                    }
                }
            }
            tables
                .associations_of(procedure_id)
                .map(|a| a.permit_type_id)
                .collect()
        };

        self.ensure_categories_for_procedure(procedure_id, &attached_ids)?;

        let tables = self.lock();
        Ok(tables.associations_of(procedure_id).cloned().collect())
    }

    /// Remove a permit association. Refused while documents or entity-fee
    /// receipts are still filed under that permit type.
    pub fn detach_permit_type(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
    ) -> Result<()> {
        let mut tables = self.lock();
        tables.association_mut(procedure_id, permit_type_id)?;

        let documents = tables
            .documents_of(procedure_id)
            .filter(|d| d.permit_type_id == Some(permit_type_id))
            .count();
        let receipts = tables
            .receipts
            .values()
            .filter(|r| {
                r.procedure_id == procedure_id
                    && r.kind == ReceiptKind::EntityFee { permit_type_id }
            })
            .count();
        if documents > 0 || receipts > 0 {
            return Err(EngineError::validation(format!(
                "permit type {permit_type_id} still has {documents} documents \
                 and {receipts} receipts"
            )));
        }

        tables
            .associations
            .retain(|a| a.key() != (procedure_id, permit_type_id));
        tables.categories.retain(|_, c| {
            !(c.procedure_id == procedure_id && c.permit_type_id == Some(permit_type_id))
        });
        let fallback = tables.first_permit_type(procedure_id);
        for payment in tables.payments.values_mut() {
            if payment.procedure_id == procedure_id
                && payment.permit_type_id == Some(permit_type_id)
            {
                payment.permit_type_id = fallback;
            }
        }
        tracing::info!(
            procedure_id = %procedure_id,
            permit_type_id = %permit_type_id,
            "Permit type detached"
        );
        Ok(())
    }

    /// Authoritative status write. Any of the six states is accepted,
    /// including `REJECTED`, and the monotonic rule does not apply.
    pub fn set_permit_status(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
        status: PermitStatus,
    ) -> Result<PermitAssociation> {
        let mut tables = self.lock();
        let association = tables.association_mut(procedure_id, permit_type_id)?;
        let previous = association.status;
        association.status = status;
        tracing::info!(
            procedure_id = %procedure_id,
            permit_type_id = %permit_type_id,
            from = %previous,
            to = %status,
            "Permit status overridden"
        );
        Ok(association.clone())
    }

    pub fn set_permit_dates(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
        dates: PermitDates,
    ) -> Result<PermitAssociation> {
        let mut tables = self.lock();
        let association = tables.association_mut(procedure_id, permit_type_id)?;
        association
            .milestones
            .apply_manual(dates.start_date, dates.end_date, dates.expiry_date);
        Ok(association.clone())
    }

    pub fn association(
        &self,
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
    ) -> Result<PermitAssociation> {
        let mut tables = self.lock();
        tables
            .association_mut(procedure_id, permit_type_id)
            .map(|a| a.clone())
    }
}
