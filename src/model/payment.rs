use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DocumentId, PaymentId, PermitTypeId, ProcedureId, ReceiptId, UploadedFile};

/// Back-office verification state of a service payment voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Confirmed,
    Flagged,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Confirmed => "CONFIRMED",
            VerificationStatus::Flagged => "FLAGGED",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(VerificationStatus::Pending),
            "CONFIRMED" => Ok(VerificationStatus::Confirmed),
            "FLAGGED" => Ok(VerificationStatus::Flagged),
            _ => Err(format!("unknown verification status: {s}")),
        }
    }
}

/// A service-fee payment backed by a voucher document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePayment {
    pub id: PaymentId,
    pub procedure_id: ProcedureId,
    pub permit_type_id: Option<PermitTypeId>,
    pub document_id: DocumentId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub note: Option<String>,
    pub verification: VerificationStatus,
}

/// One voucher tuple of a batch: file, amount, bank note and date.
///
/// Amounts arrive as text; tuples with an empty amount are ignored.
#[derive(Debug, Clone, Default)]
pub struct VoucherInput {
    pub file: Option<UploadedFile>,
    pub amount: Option<String>,
    pub bank: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Field-only update of a service payment record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// Which fee a receipt documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptKind {
    /// Fee owed to the government entity for one permit type.
    EntityFee { permit_type_id: PermitTypeId },
    /// Fee charged by the agent (tramitador) for the whole procedure.
    AgentFee,
}

/// Payment receipt stored outside the document taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub procedure_id: ProcedureId,
    #[serde(flatten)]
    pub kind: ReceiptKind,
    pub path: String,
    pub original_filename: String,
    pub extension: String,
    pub size: u64,
    pub amount: Option<Decimal>,
    pub bank: Option<String>,
    pub closing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub amount: Option<Decimal>,
    pub bank: Option<String>,
    pub closing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub procedure_id: ProcedureId,
    pub kind: ReceiptKind,
    pub file: UploadedFile,
    pub fields: ReceiptFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_parsing_is_closed() {
        assert_eq!(
            "confirmed".parse::<VerificationStatus>(),
            Ok(VerificationStatus::Confirmed)
        );
        assert!("PAID".parse::<VerificationStatus>().is_err());
    }

    #[test]
    fn receipt_kind_is_flattened() {
        let receipt = Receipt {
            id: ReceiptId(1),
            procedure_id: ProcedureId(1),
            kind: ReceiptKind::EntityFee {
                permit_type_id: PermitTypeId(3),
            },
            path: "a.pdf".into(),
            original_filename: "a.pdf".into(),
            extension: "pdf".into(),
            size: 1,
            amount: None,
            bank: None,
            closing_date: None,
        };
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["kind"], "entity_fee");
        assert_eq!(value["permit_type_id"], 3);
    }
}
