//! Category semantics and the triggers they drive.
//!
//! A category is tagged once, when it is created, by matching its name
//! against [`SEMANTIC_RULES`]. Every later upload looks the tag up in
//! [`status_trigger`] and [`date_trigger`] instead of re-reading the name.

use serde::{Deserialize, Serialize};

use super::state::PermitStatus;
use crate::model::Section;

/// What a category means for the permit it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategorySemantic {
    /// Final resolution: a decree or a summary sheet.
    Resolution,
    /// The dossier / CPB filing that opens the government procedure.
    Dossier,
    /// Anything else.
    #[default]
    General,
}

/// Which permit-association date an upload stamps with today's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTrigger {
    Start,
    End,
}

/// A keyword rule: every needle in `all_of` must appear in the lowercased
/// category name for the rule to match.
struct SemanticRule {
    all_of: &'static [&'static str],
    semantic: CategorySemantic,
}

/// Rules are checked in order; the first match wins, so resolution keywords
/// take precedence over dossier keywords.
const SEMANTIC_RULES: &[SemanticRule] = &[
    SemanticRule {
        all_of: &["decreto"],
        semantic: CategorySemantic::Resolution,
    },
    SemanticRule {
        all_of: &["decree"],
        semantic: CategorySemantic::Resolution,
    },
    SemanticRule {
        all_of: &["hoja resumen"],
        semantic: CategorySemantic::Resolution,
    },
    SemanticRule {
        all_of: &["summary sheet"],
        semantic: CategorySemantic::Resolution,
    },
    SemanticRule {
        all_of: &["expediente", "cpb"],
        semantic: CategorySemantic::Dossier,
    },
    SemanticRule {
        all_of: &["file", "cpb"],
        semantic: CategorySemantic::Dossier,
    },
    SemanticRule {
        all_of: &["dossier", "cpb"],
        semantic: CategorySemantic::Dossier,
    },
];

impl CategorySemantic {
    /// Tag a category by its name (case-insensitive substring match).
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        SEMANTIC_RULES
            .iter()
            .find(|rule| rule.all_of.iter().all(|needle| lower.contains(needle)))
            .map(|rule| rule.semantic)
            .unwrap_or_default()
    }
}

/// Status an upload into a category with this tag and section asks for.
pub fn status_trigger(semantic: CategorySemantic, section: Section) -> Option<PermitStatus> {
    match (semantic, section) {
        (CategorySemantic::Resolution, _) => Some(PermitStatus::Completed),
        (CategorySemantic::Dossier, _) => Some(PermitStatus::InProgress),
        (CategorySemantic::General, Section::PermitDocuments) => Some(PermitStatus::Sd),
        (CategorySemantic::General, _) => None,
    }
}

/// Date an upload into a category with this tag stamps.
pub fn date_trigger(semantic: CategorySemantic) -> Option<DateTrigger> {
    match semantic {
        CategorySemantic::Resolution => Some(DateTrigger::End),
        CategorySemantic::Dossier => Some(DateTrigger::Start),
        CategorySemantic::General => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_resolution_names() {
        assert_eq!(
            CategorySemantic::classify("Decreto Resolutivo"),
            CategorySemantic::Resolution
        );
        assert_eq!(
            CategorySemantic::classify("HOJA RESUMEN sanitaria"),
            CategorySemantic::Resolution
        );
        assert_eq!(
            CategorySemantic::classify("Final decree"),
            CategorySemantic::Resolution
        );
    }

    #[test]
    fn classify_dossier_requires_both_keywords() {
        assert_eq!(
            CategorySemantic::classify("Expediente o CPB"),
            CategorySemantic::Dossier
        );
        assert_eq!(
            CategorySemantic::classify("file or CPB"),
            CategorySemantic::Dossier
        );
        assert_eq!(
            CategorySemantic::classify("Expediente"),
            CategorySemantic::General
        );
        assert_eq!(CategorySemantic::classify("CPB"), CategorySemantic::General);
    }

    #[test]
    fn resolution_wins_over_dossier() {
        assert_eq!(
            CategorySemantic::classify("Expediente CPB con decreto"),
            CategorySemantic::Resolution
        );
    }

    #[test]
    fn plain_names_are_general() {
        assert_eq!(
            CategorySemantic::classify("Documentos para el trámite"),
            CategorySemantic::General
        );
    }

    #[test]
    fn triggers_by_tag_and_section() {
        assert_eq!(
            status_trigger(CategorySemantic::General, Section::PermitDocuments),
            Some(PermitStatus::Sd)
        );
        assert_eq!(status_trigger(CategorySemantic::General, Section::Tracking), None);
        assert_eq!(
            status_trigger(CategorySemantic::Dossier, Section::Tracking),
            Some(PermitStatus::InProgress)
        );
        assert_eq!(date_trigger(CategorySemantic::Dossier), Some(DateTrigger::Start));
        assert_eq!(date_trigger(CategorySemantic::Resolution), Some(DateTrigger::End));
        assert_eq!(date_trigger(CategorySemantic::General), None);
    }
}
