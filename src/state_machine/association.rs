use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::semantics::DateTrigger;
use super::state::{PermitStatus, StateMachine, Transition};
use crate::model::{PermitTypeId, ProcedureId};

/// Start/end/expiry dates plus the elapsed-days figure derived from them.
///
/// `days` is `|end - start|` whenever both ends are set and `None`
/// otherwise; every setter recomputes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub days: Option<i64>,
}

impl Milestones {
    pub fn set_start(&mut self, date: Option<NaiveDate>) {
        self.start_date = date;
        self.recompute_days();
    }

    pub fn set_end(&mut self, date: Option<NaiveDate>) {
        self.end_date = date;
        self.recompute_days();
    }

    pub fn set_expiry(&mut self, date: Option<NaiveDate>) {
        self.expiry_date = date;
    }

    /// Stamp today's date on the milestone a category asks for. Last write
    /// wins; unlike status there is no monotonic rule here.
    pub fn apply(&mut self, trigger: DateTrigger, today: NaiveDate) {
        match trigger {
            DateTrigger::Start => self.set_start(Some(today)),
            DateTrigger::End => self.set_end(Some(today)),
        }
    }

    fn recompute_days(&mut self) {
        self.days = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days().abs()),
            _ => None,
        };
    }
}

/// Per-(procedure, permit type) record with its own status machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitAssociation {
    pub procedure_id: ProcedureId,
    pub permit_type_id: PermitTypeId,
    pub entity_fee: Option<Decimal>,
    pub status: PermitStatus,
    #[serde(flatten)]
    pub milestones: Milestones,
}

impl PermitAssociation {
    pub fn new(
        procedure_id: ProcedureId,
        permit_type_id: PermitTypeId,
        entity_fee: Option<Decimal>,
        status: PermitStatus,
    ) -> Self {
        Self {
            procedure_id,
            permit_type_id,
            entity_fee,
            status,
            milestones: Milestones::default(),
        }
    }

    /// Offer a target status and apply it if it escalates.
    pub fn offer(&mut self, target: PermitStatus) -> Transition {
        let transition = StateMachine::escalate(self.status, target);
        if let Transition::Escalated { to, .. } = transition {
            self.status = to;
        }
        transition
    }

    pub fn key(&self) -> (ProcedureId, PermitTypeId) {
        (self.procedure_id, self.permit_type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_need_both_ends() {
        let mut milestones = Milestones::default();
        milestones.set_start(Some(date(2024, 1, 1)));
        assert_eq!(milestones.days, None);

        milestones.set_end(Some(date(2024, 1, 10)));
        assert_eq!(milestones.days, Some(9));
    }

    #[test]
    fn days_are_absolute() {
        let mut milestones = Milestones::default();
        milestones.set_end(Some(date(2024, 1, 1)));
        milestones.set_start(Some(date(2024, 1, 10)));
        assert_eq!(milestones.days, Some(9));
    }

    #[test]
    fn clearing_a_date_clears_days() {
        let mut milestones = Milestones::default();
        milestones.set_start(Some(date(2024, 3, 1)));
        milestones.set_end(Some(date(2024, 3, 4)));
        milestones.set_end(None);
        assert_eq!(milestones.days, None);
    }

    #[test]
    fn trigger_overwrites_existing_start() {
        let mut milestones = Milestones::default();
        milestones.set_start(Some(date(2024, 1, 1)));
        milestones.apply(DateTrigger::Start, date(2024, 2, 1));
        assert_eq!(milestones.start_date, Some(date(2024, 2, 1)));
        milestones.apply(DateTrigger::End, date(2024, 2, 1));
        assert_eq!(milestones.days, Some(0));
    }

    #[test]
    fn offer_applies_only_escalations() {
        let mut assoc =
            PermitAssociation::new(ProcedureId(1), PermitTypeId(1), None, PermitStatus::Pending);
        assoc.offer(PermitStatus::InProgress);
        assert_eq!(assoc.status, PermitStatus::InProgress);
        assoc.offer(PermitStatus::Sd);
        assert_eq!(assoc.status, PermitStatus::InProgress);
    }

    #[test]
    fn association_serialization_flattens_dates() {
        let mut assoc =
            PermitAssociation::new(ProcedureId(1), PermitTypeId(2), None, PermitStatus::Sd);
        assoc.milestones.set_start(Some(date(2024, 5, 1)));
        let value = serde_json::to_value(&assoc).unwrap();
        assert_eq!(value["start_date"], "2024-05-01");
        assert_eq!(value["status"], "SD");
    }
}
