use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::semantics::{CategorySemantic, status_trigger};
use crate::model::Section;

/// The six states a permit association (or a whole procedure) can be in.
///
/// Automatic movement only goes forward by rank:
/// PENDING → SD/PAID → IN_PROGRESS → COMPLETED. `REJECTED` sits outside the
/// ladder and is only ever set or cleared by a manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitStatus {
    #[default]
    Pending,
    Sd,
    Paid,
    InProgress,
    Rejected,
    Completed,
}

impl PermitStatus {
    pub const ALL: [PermitStatus; 6] = [
        PermitStatus::Pending,
        PermitStatus::Sd,
        PermitStatus::Paid,
        PermitStatus::InProgress,
        PermitStatus::Rejected,
        PermitStatus::Completed,
    ];

    pub fn rank(self) -> i8 {
        match self {
            PermitStatus::Rejected => -1,
            PermitStatus::Pending => 0,
            PermitStatus::Sd | PermitStatus::Paid => 1,
            PermitStatus::InProgress => 2,
            PermitStatus::Completed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermitStatus::Pending => "PENDING",
            PermitStatus::Sd => "SD",
            PermitStatus::Paid => "PAID",
            PermitStatus::InProgress => "IN_PROGRESS",
            PermitStatus::Rejected => "REJECTED",
            PermitStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        PermitStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("unknown permit status: {s}"))
    }
}

/// The result of offering a target status to the escalation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved forward.
    Escalated { from: PermitStatus, to: PermitStatus },
    /// Target was not above the current rank.
    Unchanged(PermitStatus),
    /// Current status is `REJECTED`; automation never touches it.
    Locked,
}

/// Pure status rules for permit associations.
pub struct StateMachine;

impl StateMachine {
    /// Offer `target` to an association currently at `current`.
    ///
    /// Escalation is monotonic: only a strictly higher rank wins, so
    /// replaying the same upload, or uploading a lower-ranked document
    /// after a higher state was reached, is a no-op.
    pub fn escalate(current: PermitStatus, target: PermitStatus) -> Transition {
        if current == PermitStatus::Rejected {
            return Transition::Locked;
        }
        if target.rank() > current.rank() {
            Transition::Escalated {
                from: current,
                to: target,
            }
        } else {
            Transition::Unchanged(current)
        }
    }

    /// Status implied by a document landing in a category with the given
    /// semantic and section, then offered to the current status.
    pub fn on_document_created(
        current: PermitStatus,
        semantic: CategorySemantic,
        section: Section,
    ) -> Transition {
        match status_trigger(semantic, section) {
            Some(target) => Self::escalate(current, target),
            None if current == PermitStatus::Rejected => Transition::Locked,
            None => Transition::Unchanged(current),
        }
    }

    /// Rebuild the status from the documents that remain after a deletion.
    ///
    /// Each remaining document contributes the status its category would
    /// trigger; the highest rank wins and the floor is `PENDING`. A
    /// `REJECTED` association is left alone.
    pub fn recompute<I>(current: PermitStatus, remaining: I) -> PermitStatus
    where
        I: IntoIterator<Item = (CategorySemantic, Section)>,
    {
        if current == PermitStatus::Rejected {
            return current;
        }
        remaining
            .into_iter()
            .filter(|(_, section)| section.feeds_recompute())
            .filter_map(|(semantic, section)| status_trigger(semantic, section))
            .max_by_key(|status| status.rank())
            .unwrap_or(PermitStatus::Pending)
    }
}
