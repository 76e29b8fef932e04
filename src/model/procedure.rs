use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PermitTypeId, ProcedureId};
use crate::state_machine::{Milestones, PermitStatus};

/// One customs-permit case tied to a shipment and a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: ProcedureId,
    pub shipment_ref: String,
    pub client_ref: String,
    pub entity_ref: String,
    pub total_price: Option<Decimal>,
    pub agent_fee: Option<Decimal>,
    pub status: PermitStatus,
    #[serde(flatten)]
    pub milestones: Milestones,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry shared by every procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitType {
    pub id: PermitTypeId,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewProcedure {
    pub shipment_ref: String,
    pub client_ref: String,
    pub entity_ref: String,
    pub total_price: Option<Decimal>,
    pub agent_fee: Option<Decimal>,
}

/// Field-level update; `None` leaves a field untouched.
///
/// Date fields are doubly optional so a caller can clear a date with
/// `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct ProcedureUpdate {
    pub total_price: Option<Decimal>,
    pub agent_fee: Option<Decimal>,
    pub status: Option<PermitStatus>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub expiry_date: Option<Option<NaiveDate>>,
}

/// One permit type to attach, with its fee and optional initial status.
#[derive(Debug, Clone)]
pub struct PermitAttachment {
    pub permit_type_id: PermitTypeId,
    pub entity_fee: Option<Decimal>,
    pub status: Option<PermitStatus>,
}

impl PermitAttachment {
    pub fn new(permit_type_id: PermitTypeId) -> Self {
        Self {
            permit_type_id,
            entity_fee: None,
            status: None,
        }
    }
}

/// Manual date write for a permit association.
#[derive(Debug, Clone, Default)]
pub struct PermitDates {
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub expiry_date: Option<Option<NaiveDate>>,
}

impl Milestones {
    /// Apply a manual date write, leaving untouched fields alone.
    pub fn apply_manual(
        &mut self,
        start: Option<Option<NaiveDate>>,
        end: Option<Option<NaiveDate>>,
        expiry: Option<Option<NaiveDate>>,
    ) {
        if let Some(start) = start {
            self.set_start(start);
        }
        if let Some(end) = end {
            self.set_end(end);
        }
        if let Some(expiry) = expiry {
            self.set_expiry(expiry);
        }
    }
}
