use super::Engine;
use super::tables::Tables;
use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::model::{Category, CategoryId, CategoryRef, PermitTypeId, ProcedureId, Section};
use crate::state_machine::CategorySemantic;
use crate::storage::FileStorage;

/// Categories every attached permit type gets.
pub const DEFAULT_CATEGORIES: &[(Section, &str)] = &[
    (Section::PermitDocuments, "Documentos para el trámite"),
    (Section::Photos, "Fotos de la mercancía"),
    (Section::Tracking, "Expediente o CPB"),
    (Section::Tracking, "Decreto Resolutivo"),
    (Section::Tracking, "Hoja Resumen"),
];

/// The shared category vouchers are filed under.
pub const SERVICE_PAYMENT_CATEGORY: &str = "Pago de Servicio";

/// Where a document will be filed, decided before anything is written.
#[derive(Debug, Clone)]
pub(super) struct CategoryPlan {
    pub target: PlannedCategory,
    pub section: Section,
    /// Effective permit type of the document, after any category override.
    pub permit_type_id: Option<PermitTypeId>,
}

#[derive(Debug, Clone)]
pub(super) enum PlannedCategory {
    Existing(CategoryId),
    New(String),
}

/// Find the category with this exact scope or create it. Returns the
/// category and whether it was created.
pub(super) fn resolve_or_create(
    tables: &mut Tables,
    procedure_id: ProcedureId,
    name: &str,
    section: Section,
    permit_type_id: Option<PermitTypeId>,
) -> (Category, bool) {
    let permit_type_id = if section.is_permit_scoped() {
        permit_type_id
    } else {
        None
    };
    let name = name.trim();

    if let Some(existing) = tables
        .categories
        .values()
        .find(|c| c.matches(procedure_id, name, section, permit_type_id))
    {
        tracing::debug!(category_id = %existing.id, name, "Category reused");
        return (existing.clone(), false);
    }

    let category = Category {
        id: tables.sequences.category.next(),
        procedure_id,
        name: name.to_string(),
        section,
        permit_type_id,
        semantic: CategorySemantic::classify(name),
    };
    tables.categories.insert(category.id, category.clone());
    tracing::info!(
        category_id = %category.id,
        procedure_id = %procedure_id,
        name,
        %section,
        semantic = ?category.semantic,
        "Category created"
    );
    (category, true)
}

/// Validate routing for a new document without touching the tables.
pub(super) fn plan_category(
    tables: &Tables,
    procedure_id: ProcedureId,
    category: &CategoryRef,
    section: Section,
    permit_type_id: Option<PermitTypeId>,
) -> Result<CategoryPlan> {
    tables.procedure(procedure_id)?;

    let plan = match category {
        CategoryRef::Existing(id) => {
            let existing = tables.category(*id)?;
            if existing.procedure_id != procedure_id {
                return Err(EngineError::validation(format!(
                    "category {id} belongs to procedure {}, not {procedure_id}",
                    existing.procedure_id
                )));
            }
            if existing.section != section {
                return Err(EngineError::validation(format!(
                    "category {id} is in section {}, not {section}",
                    existing.section
                )));
            }
            CategoryPlan {
                target: PlannedCategory::Existing(*id),
                section,
                // A permit-scoped category decides the routing.
                permit_type_id: existing.permit_type_id.or(permit_type_id),
            }
        }
        CategoryRef::New(name) => {
            if name.trim().is_empty() {
                return Err(EngineError::validation("category name must not be empty"));
            }
            CategoryPlan {
                target: PlannedCategory::New(name.trim().to_string()),
                section,
                permit_type_id,
            }
        }
    };

    if let Some(permit_type_id) = plan.permit_type_id {
        tables.require_attached(procedure_id, permit_type_id)?;
    }
    Ok(plan)
}

/// Apply a plan: fetch the existing category or create the new one.
pub(super) fn commit_category(
    tables: &mut Tables,
    procedure_id: ProcedureId,
    plan: &CategoryPlan,
) -> Result<Category> {
    match &plan.target {
        PlannedCategory::Existing(id) => tables.category(*id).cloned(),
        PlannedCategory::New(name) => Ok(resolve_or_create(
            tables,
            procedure_id,
            name,
            plan.section,
            plan.permit_type_id,
        )
        .0),
    }
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    /// Return the category matching (procedure, name, section, permit type),
    /// creating it if needed. Calling twice with the same scope yields the
    /// same id.
    pub fn resolve_or_create_category(
        &self,
        procedure_id: ProcedureId,
        name: &str,
        section: Section,
        permit_type_id: Option<PermitTypeId>,
    ) -> Result<CategoryId> {
        if name.trim().is_empty() {
            return Err(EngineError::validation("category name must not be empty"));
        }
        let mut tables = self.lock();
        tables.procedure(procedure_id)?;
        if let (true, Some(permit_type_id)) = (section.is_permit_scoped(), permit_type_id) {
            tables.require_attached(procedure_id, permit_type_id)?;
        }
        let (category, _) =
            resolve_or_create(&mut tables, procedure_id, name, section, permit_type_id);
        Ok(category.id)
    }

    /// Make sure every given permit type has [`DEFAULT_CATEGORIES`] and the
    /// procedure has its shared service-payment category. Returns how many
    /// categories were created.
    pub fn ensure_categories_for_procedure(
        &self,
        procedure_id: ProcedureId,
        permit_type_ids: &[PermitTypeId],
    ) -> Result<usize> {
        let mut tables = self.lock();
        tables.procedure(procedure_id)?;
        for permit_type_id in permit_type_ids {
            tables.require_attached(procedure_id, *permit_type_id)?;
        }

        let mut created = 0;
        for permit_type_id in permit_type_ids {
            for (section, name) in DEFAULT_CATEGORIES {
                let (_, new) = resolve_or_create(
                    &mut tables,
                    procedure_id,
                    name,
                    *section,
                    Some(*permit_type_id),
                );
                created += usize::from(new);
            }
        }
        let (_, new) = resolve_or_create(
            &mut tables,
            procedure_id,
            SERVICE_PAYMENT_CATEGORY,
            Section::ServicePayment,
            None,
        );
        created += usize::from(new);
        Ok(created)
    }

    pub fn list_categories(&self, procedure_id: ProcedureId) -> Result<Vec<Category>> {
        let tables = self.lock();
        tables.procedure(procedure_id)?;
        Ok(tables
            .categories
            .values()
            .filter(|c| c.procedure_id == procedure_id)
            .cloned()
            .collect())
    }

    /// Delete an empty category.
    pub fn delete_category(&self, id: CategoryId) -> Result<()> {
        let mut tables = self.lock();
        tables.category(id)?;
        let in_use = tables.documents.values().filter(|d| d.category_id == id).count();
        if in_use > 0 {
            return Err(EngineError::validation(format!(
                "category {id} still holds {in_use} documents"
            )));
        }
        tables.categories.remove(&id);
        Ok(())
    }
}
