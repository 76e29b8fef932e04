use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CategoryId, PermitTypeId, ProcedureId};
use crate::state_machine::CategorySemantic;

/// The four fixed document buckets of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    PermitDocuments,
    Photos,
    ServicePayment,
    Tracking,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::PermitDocuments,
        Section::Photos,
        Section::ServicePayment,
        Section::Tracking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Section::PermitDocuments => "permit_documents",
            Section::Photos => "photos",
            Section::ServicePayment => "service_payment",
            Section::Tracking => "tracking",
        }
    }

    /// Service-payment categories are shared by every permit type.
    pub fn is_permit_scoped(self) -> bool {
        !matches!(self, Section::ServicePayment)
    }

    /// Sections whose documents count when a status is rebuilt after a delete.
    pub fn feeds_recompute(self) -> bool {
        matches!(self, Section::PermitDocuments | Section::Tracking)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == wanted)
            .ok_or_else(|| format!("unknown section: {s}"))
    }
}

/// A named bucket documents are filed into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub procedure_id: ProcedureId,
    pub name: String,
    pub section: Section,
    /// `None` means shared across all permit types of the procedure.
    pub permit_type_id: Option<PermitTypeId>,
    /// Tagged from the name when the category is created.
    pub semantic: CategorySemantic,
}

impl Category {
    pub fn matches(
        &self,
        procedure_id: ProcedureId,
        name: &str,
        section: Section,
        permit_type_id: Option<PermitTypeId>,
    ) -> bool {
        self.procedure_id == procedure_id
            && self.section == section
            && self.permit_type_id == permit_type_id
            && self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// How a caller points a new document at its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryRef {
    /// File into a category that already exists.
    Existing(CategoryId),
    /// Create (or reuse) a category with this name.
    New(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_parsing_and_display() {
        assert_eq!("photos".parse::<Section>(), Ok(Section::Photos));
        assert_eq!(" Tracking ".parse::<Section>(), Ok(Section::Tracking));
        assert!("invoices".parse::<Section>().is_err());
        assert_eq!(Section::ServicePayment.to_string(), "service_payment");
    }

    #[test]
    fn only_service_payment_is_shared() {
        assert!(!Section::ServicePayment.is_permit_scoped());
        assert!(Section::Photos.is_permit_scoped());
        assert!(Section::Tracking.feeds_recompute());
        assert!(!Section::Photos.feeds_recompute());
    }

    #[test]
    fn category_ref_wire_shape() {
        let existing: CategoryRef = serde_json::from_str(r#"{"existing": 4}"#).unwrap();
        assert_eq!(existing, CategoryRef::Existing(CategoryId(4)));
        let new: CategoryRef = serde_json::from_str(r#"{"new": "Fotos"}"#).unwrap();
        assert_eq!(new, CategoryRef::New("Fotos".into()));
    }
}
