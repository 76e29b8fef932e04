//! Records owned by the engine and the inputs that create them.

mod category;
mod document;
mod ids;
mod payment;
mod procedure;

pub use category::{Category, CategoryRef, Section};
pub use document::{Document, NewDocument, UploadedFile};
pub use ids::{CategoryId, DocumentId, PaymentId, PermitTypeId, ProcedureId, ReceiptId, Sequence};
pub use payment::{
    NewReceipt, PaymentUpdate, Receipt, ReceiptFields, ReceiptKind, ServicePayment,
    VerificationStatus, VoucherInput,
};
pub use procedure::{
    NewProcedure, PermitAttachment, PermitDates, PermitType, Procedure, ProcedureUpdate,
};
