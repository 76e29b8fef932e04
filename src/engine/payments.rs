//! Service payments, vouchers and fee receipts.
//!
//! Vouchers are ordinary documents in the `service_payment` section with a
//! payment record linked to them. Entity-fee and agent-fee receipts live
//! outside the document taxonomy and carry their own file.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::taxonomy::SERVICE_PAYMENT_CATEGORY;
use super::{Engine, ItemOutcome};
use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::model::{
    CategoryRef, DocumentId, NewDocument, NewReceipt, PaymentId, PaymentUpdate, ProcedureId,
    Receipt, ReceiptFields, ReceiptId, ReceiptKind, Section, ServicePayment, UploadedFile,
    VerificationStatus, VoucherInput,
};
use crate::storage::FileStorage;

/// Parse a user-typed amount such as `"150.00"` or `"1,250.50"`.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let amount = Decimal::from_str(&cleaned)
        .map_err(|_| EngineError::validation(format!("amount '{raw}' is not numeric")))?;
    if amount.is_sign_negative() {
        return Err(EngineError::validation(format!(
            "amount '{raw}' must not be negative"
        )));
    }
    Ok(amount)
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    /// Set the verification state of a voucher, creating its payment record
    /// when none exists yet. A new record is attached to the procedure's
    /// first permit type.
    pub fn upsert_verification(
        &self,
        document_id: DocumentId,
        status: VerificationStatus,
    ) -> Result<ServicePayment> {
        let today = self.today();
        let mut tables = self.lock();
        let document = tables.document(document_id)?.clone();
        if document.section != Section::ServicePayment {
            return Err(EngineError::validation(format!(
                "document {document_id} is not a service payment voucher"
            )));
        }

        if let Some(payment) = tables
            .payments
            .values_mut()
            .find(|p| p.document_id == document_id)
        {
            payment.verification = status;
            tracing::info!(payment_id = %payment.id, %status, "Payment verification updated");
            return Ok(payment.clone());
        }

        let payment = ServicePayment {
            id: tables.sequences.payment.next(),
            procedure_id: document.procedure_id,
            permit_type_id: tables.first_permit_type(document.procedure_id),
            document_id,
            amount: Decimal::ZERO,
            payment_date: today,
            note: None,
            verification: status,
        };
        tables.payments.insert(payment.id, payment.clone());
        tracing::info!(payment_id = %payment.id, %status, "Payment verification recorded");
        Ok(payment)
    }

    /// Ingest voucher tuples. Tuples without an amount are skipped; every
    /// other tuple stores its file under the shared service-payment category
    /// and gets a `PENDING` payment record dated to the supplied date or
    /// today.
    pub async fn ingest_vouchers(
        &self,
        procedure_id: ProcedureId,
        vouchers: Vec<VoucherInput>,
    ) -> Vec<ItemOutcome<ServicePayment>> {
        let mut outcomes = Vec::with_capacity(vouchers.len());
        for (index, voucher) in vouchers.into_iter().enumerate() {
            let has_amount = voucher
                .amount
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty());
            if !has_amount {
                outcomes.push(ItemOutcome::Skipped { index });
                continue;
            }
            let result = self.ingest_voucher(procedure_id, voucher).await;
            outcomes.push(ItemOutcome::from_result(index, result));
        }
        outcomes
    }

    async fn ingest_voucher(
        &self,
        procedure_id: ProcedureId,
        voucher: VoucherInput,
    ) -> Result<ServicePayment> {
        let amount = parse_amount(voucher.amount.as_deref().unwrap_or_default())?;
        let file = voucher
            .file
            .ok_or_else(|| EngineError::validation("voucher file is required"))?;

        let document = self
            .create_document(NewDocument {
                procedure_id,
                category: CategoryRef::New(SERVICE_PAYMENT_CATEGORY.to_string()),
                permit_type_id: None,
                section: Section::ServicePayment,
                file,
            })
            .await?;

        let payment_date = voucher.date.unwrap_or_else(|| self.today());
        let mut tables = self.lock();
        let payment = ServicePayment {
            id: tables.sequences.payment.next(),
            procedure_id,
            permit_type_id: tables.first_permit_type(procedure_id),
            document_id: document.id,
            amount,
            payment_date,
            note: voucher.bank.filter(|b| !b.trim().is_empty()),
            verification: VerificationStatus::Pending,
        };
        tables.payments.insert(payment.id, payment.clone());
        tracing::info!(
            payment_id = %payment.id,
            document_id = %document.id,
            amount = %payment.amount,
            "Voucher recorded"
        );
        Ok(payment)
    }

    pub fn payment(&self, id: PaymentId) -> Result<ServicePayment> {
        self.lock()
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("payment", id))
    }

    pub fn update_payment(&self, id: PaymentId, update: PaymentUpdate) -> Result<ServicePayment> {
        if update.amount.is_some_and(|a| a.is_sign_negative()) {
            return Err(EngineError::validation("amount must not be negative"));
        }
        let mut tables = self.lock();
        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("payment", id))?;
        if let Some(amount) = update.amount {
            payment.amount = amount;
        }
        if let Some(date) = update.payment_date {
            payment.payment_date = date;
        }
        if let Some(note) = update.note {
            payment.note = Some(note);
        }
        Ok(payment.clone())
    }

    pub async fn create_receipt(&self, input: NewReceipt) -> Result<Receipt> {
        if input.file.is_empty() {
            return Err(EngineError::validation("receipt file is missing or empty"));
        }
        if input.fields.amount.is_some_and(|a| a.is_sign_negative()) {
            return Err(EngineError::validation("amount must not be negative"));
        }
        {
            let tables = self.lock();
            tables.procedure(input.procedure_id)?;
            if let ReceiptKind::EntityFee { permit_type_id } = input.kind {
                tables.require_attached(input.procedure_id, permit_type_id)?;
            }
        }

        let path = self
            .storage
            .store(&input.file.bytes, &input.file.original_filename)
            .await?;

        let mut tables = self.lock();
        let receipt = Receipt {
            id: tables.sequences.receipt.next(),
            procedure_id: input.procedure_id,
            kind: input.kind,
            path,
            original_filename: input.file.original_filename.clone(),
            extension: input.file.extension(),
            size: input.file.size(),
            amount: input.fields.amount,
            bank: input.fields.bank,
            closing_date: input.fields.closing_date,
        };
        tables.receipts.insert(receipt.id, receipt.clone());
        tracing::info!(receipt_id = %receipt.id, kind = ?receipt.kind, "Receipt created");
        Ok(receipt)
    }

    /// Update amount, bank and closing date without touching the file.
    pub fn update_receipt(&self, id: ReceiptId, fields: ReceiptFields) -> Result<Receipt> {
        if fields.amount.is_some_and(|a| a.is_sign_negative()) {
            return Err(EngineError::validation("amount must not be negative"));
        }
        let mut tables = self.lock();
        let receipt = tables
            .receipts
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("receipt", id))?;
        if fields.amount.is_some() {
            receipt.amount = fields.amount;
        }
        if fields.bank.is_some() {
            receipt.bank = fields.bank;
        }
        if fields.closing_date.is_some() {
            receipt.closing_date = fields.closing_date;
        }
        Ok(receipt.clone())
    }

    /// Swap the stored file of a receipt, keeping the row and its fields.
    pub async fn replace_receipt_file(&self, id: ReceiptId, file: UploadedFile) -> Result<Receipt> {
        if file.is_empty() {
            return Err(EngineError::validation("receipt file is missing or empty"));
        }
        self.lock().receipt(id)?;
        let new_path = self.storage.store(&file.bytes, &file.original_filename).await?;

        let (old_path, receipt) = {
            let mut tables = self.lock();
            let receipt = tables
                .receipts
                .get_mut(&id)
                .ok_or_else(|| EngineError::not_found("receipt", id))?;
            let old_path = std::mem::replace(&mut receipt.path, new_path);
            receipt.original_filename = file.original_filename.clone();
            receipt.extension = file.extension();
            receipt.size = file.size();
            (old_path, receipt.clone())
        };

        if let Err(err) = self.discard_file(&old_path).await {
            tracing::warn!(
                receipt_id = %id,
                path = %old_path,
                error = %err,
                "Old receipt file not removed"
            );
        }
        tracing::info!(receipt_id = %id, "Receipt file replaced");
        Ok(receipt)
    }

    pub async fn delete_receipt(&self, id: ReceiptId) -> Result<()> {
        let path = self.lock().receipt(id)?.path.clone();
        self.discard_file(&path).await?;
        self.lock().receipts.remove(&id);
        tracing::info!(receipt_id = %id, "Receipt deleted");
        Ok(())
    }
}
