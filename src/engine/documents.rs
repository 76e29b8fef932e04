use super::taxonomy::{commit_category, plan_category, resolve_or_create};
use super::tables::Tables;
use super::{Engine, ItemOutcome};
use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::model::{
    Category, Document, DocumentId, NewDocument, PermitTypeId, ProcedureId, Section,
};
use crate::state_machine::{CategorySemantic, PermitStatus, StateMachine, Transition, date_trigger};
use crate::storage::FileStorage;

/// Feed a freshly filed document into the escalation engine and the
/// duration tracker. Both read the category tag; neither depends on the
/// other.
fn apply_upload_triggers(
    tables: &mut Tables,
    document: &Document,
    category: &Category,
    today: chrono::NaiveDate,
) {
    let Some(permit_type_id) = document.permit_type_id else {
        return;
    };
    let Ok(association) = tables.association_mut(document.procedure_id, permit_type_id) else {
        return;
    };

    match StateMachine::on_document_created(association.status, category.semantic, document.section)
    {
        Transition::Escalated { from, to } => {
            association.status = to;
            tracing::info!(
                procedure_id = %document.procedure_id,
                permit_type_id = %permit_type_id,
                %from,
                %to,
                category = %category.name,
                "Permit status escalated"
            );
        }
        Transition::Locked => {
            tracing::debug!(permit_type_id = %permit_type_id, "Rejected permit left untouched");
        }
        Transition::Unchanged(_) => {}
    }

    if let Some(trigger) = date_trigger(category.semantic) {
        association.milestones.apply(trigger, today);
        tracing::info!(
            permit_type_id = %permit_type_id,
            trigger = ?trigger,
            days = ?association.milestones.days,
            "Permit milestone stamped"
        );
    }
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    /// File one document: resolve its category, store the bytes, persist the
    /// metadata and run the upload triggers.
    ///
    /// Fails with `NotFound` when the procedure or an existing category is
    /// missing. A storage failure aborts before any metadata is written.
    pub async fn create_document(&self, input: NewDocument) -> Result<Document> {
        if input.file.is_empty() {
            return Err(EngineError::validation(format!(
                "file '{}' is missing or empty",
                input.file.original_filename
            )));
        }

        {
            let tables = self.lock();
            plan_category(
                &tables,
                input.procedure_id,
                &input.category,
                input.section,
                input.permit_type_id,
            )?;
        }

        let path = self
            .storage
            .store(&input.file.bytes, &input.file.original_filename)
            .await?;

        let committed = {
            let mut tables = self.lock();
            self.commit_document(&mut tables, &input, &path)
        };
        match committed {
            Ok(document) => Ok(document),
            Err(err) => {
                // Routing went stale while the bytes were being written.
                if let Err(cleanup) = self.storage.delete(&path).await {
                    tracing::warn!(path = %path, error = %cleanup, "Orphaned stored file");
                }
                Err(err)
            }
        }
    }

    fn commit_document(
        &self,
        tables: &mut Tables,
        input: &NewDocument,
        path: &str,
    ) -> Result<Document> {
        let plan = plan_category(
            tables,
            input.procedure_id,
            &input.category,
            input.section,
            input.permit_type_id,
        )?;
        let category = commit_category(tables, input.procedure_id, &plan)?;

        let document = Document {
            id: tables.sequences.document.next(),
            procedure_id: input.procedure_id,
            category_id: category.id,
            permit_type_id: plan.permit_type_id,
            section: plan.section,
            name: input.file.display_name(),
            original_filename: input.file.original_filename.clone(),
            extension: input.file.extension(),
            size: input.file.size(),
            path: path.to_string(),
            created_at: self.clock.now(),
        };
        tables.documents.insert(document.id, document.clone());
        tracing::info!(
            document_id = %document.id,
            procedure_id = %document.procedure_id,
            category = %category.name,
            section = %document.section,
            "Document created"
        );

        apply_upload_triggers(tables, &document, &category, self.today());
        Ok(document)
    }

    /// File several documents. Best-effort: each item succeeds or fails on
    /// its own and the outcome list says which.
    pub async fn create_documents_batch(
        &self,
        items: Vec<NewDocument>,
    ) -> Vec<ItemOutcome<Document>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let result = self.create_document(item).await;
            outcomes.push(ItemOutcome::from_result(index, result));
        }
        outcomes
    }

    /// Delete a document: stored bytes first, then the row, then rebuild the
    /// permit status from whatever documents remain.
    ///
    /// Dates stamped by the duration tracker are left as they are.
    /// Returns the recomputed status when the document was permit-scoped.
    pub async fn delete_document(&self, id: DocumentId) -> Result<Option<PermitStatus>> {
        let path = self.lock().document(id)?.path.clone();
        self.discard_file(&path).await?;

        let mut tables = self.lock();
        let Some(document) = tables.documents.remove(&id) else {
            return Ok(None);
        };
        tables.payments.retain(|_, p| p.document_id != id);
        tracing::info!(
            document_id = %id,
            procedure_id = %document.procedure_id,
            "Document deleted"
        );

        let Some(permit_type_id) = document.permit_type_id else {
            return Ok(None);
        };
        Ok(recompute_status(&mut tables, document.procedure_id, permit_type_id))
    }

    pub fn document(&self, id: DocumentId) -> Result<Document> {
        self.lock().document(id).cloned()
    }

    pub fn document_url(&self, id: DocumentId) -> Result<String> {
        let path = self.lock().document(id)?.path.clone();
        Ok(self.storage.url_for(&path))
    }

    /// Move an existing document to `section` under `permit_type_id`.
    ///
    /// A document already stamped that way is left alone. Otherwise it is
    /// refiled into the same-named category of the new scope. The permit it
    /// left is recomputed, and the permit it joined is offered the status its
    /// documents now imply, so it can only move up. Dates are not stamped
    /// again. Service payment vouchers cannot be restamped.
    pub fn restamp_document(
        &self,
        id: DocumentId,
        procedure_id: ProcedureId,
        section: Section,
        permit_type_id: PermitTypeId,
    ) -> Result<Restamp> {
        if !section.is_permit_scoped() {
            return Err(EngineError::validation(format!(
                "section {section} cannot be assigned to a permit type"
            )));
        }
        let mut tables = self.lock();
        let document = tables.document(id)?.clone();
        if document.procedure_id != procedure_id {
            return Err(EngineError::validation(format!(
                "document {id} belongs to procedure {}, not {procedure_id}",
                document.procedure_id
            )));
        }
        if document.section == Section::ServicePayment {
            return Err(EngineError::validation(format!(
                "document {id} is a service payment voucher"
            )));
        }
        tables.require_attached(procedure_id, permit_type_id)?;
        if document.section == section && document.permit_type_id == Some(permit_type_id) {
            return Ok(Restamp::Unchanged);
        }

        let name = tables.category(document.category_id)?.name.clone();
        let (category, _) =
            resolve_or_create(&mut tables, procedure_id, &name, section, Some(permit_type_id));
        if let Some(entry) = tables.documents.get_mut(&id) {
            entry.section = section;
            entry.permit_type_id = Some(permit_type_id);
            entry.category_id = category.id;
        }
        tracing::info!(
            document_id = %id,
            %section,
            permit_type_id = %permit_type_id,
            "Document restamped"
        );

        if let Some(previous) = document.permit_type_id {
            recompute_status(&mut tables, procedure_id, previous);
        }
        if document.permit_type_id != Some(permit_type_id) {
            offer_derived_status(&mut tables, procedure_id, permit_type_id);
        }
        Ok(Restamp::Moved {
            from_section: document.section,
            from_permit_type: document.permit_type_id,
        })
    }
}

/// Result of [`Engine::restamp_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "restamp", rename_all = "snake_case")]
pub enum Restamp {
    Unchanged,
    Moved {
        from_section: Section,
        from_permit_type: Option<PermitTypeId>,
    },
}

fn filed_under(
    tables: &Tables,
    procedure_id: ProcedureId,
    permit_type_id: PermitTypeId,
) -> Vec<(CategorySemantic, Section)> {
    tables
        .documents_of(procedure_id)
        .filter(|d| d.permit_type_id == Some(permit_type_id))
        .filter_map(|d| {
            tables
                .categories
                .get(&d.category_id)
                .map(|c| (c.semantic, d.section))
        })
        .collect()
}

/// Escalate a permit towards the status its filed documents imply.
fn offer_derived_status(
    tables: &mut Tables,
    procedure_id: ProcedureId,
    permit_type_id: PermitTypeId,
) {
    let derived = StateMachine::recompute(
        PermitStatus::Pending,
        filed_under(tables, procedure_id, permit_type_id),
    );
    let Ok(association) = tables.association_mut(procedure_id, permit_type_id) else {
        return;
    };
    if let Transition::Escalated { from, to } = StateMachine::escalate(association.status, derived)
    {
        association.status = to;
        tracing::info!(
            procedure_id = %procedure_id,
            permit_type_id = %permit_type_id,
            %from,
            %to,
            "Permit status escalated by restamp"
        );
    }
}

/// Rebuild a permit status from the documents still filed under it.
pub(super) fn recompute_status(
    tables: &mut Tables,
    procedure_id: ProcedureId,
    permit_type_id: PermitTypeId,
) -> Option<PermitStatus> {
    let remaining = filed_under(tables, procedure_id, permit_type_id);
    let association = tables.association_mut(procedure_id, permit_type_id).ok()?;
    let recomputed = StateMachine::recompute(association.status, remaining);
    if recomputed != association.status {
        tracing::info!(
            procedure_id = %procedure_id,
            permit_type_id = %permit_type_id,
            from = %association.status,
            to = %recomputed,
            "Permit status recomputed"
        );
        association.status = recomputed;
    }
    Some(association.status)
}
