//! Numeric identifiers for every persisted record.
//!
//! Ids are allocated sequentially per table, the way a database sequence
//! would, and are wrapped in newtypes so a document id can never be passed
//! where a category id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

define_id! {
    /// Identifies a procedure (trámite).
    ProcedureId,
    /// Identifies an entry of the shared permit-type catalog.
    PermitTypeId,
    /// Identifies a document category.
    CategoryId,
    /// Identifies a stored document.
    DocumentId,
    /// Identifies a service payment record.
    PaymentId,
    /// Identifies an entity-fee or agent-fee receipt.
    ReceiptId,
}

/// Monotonic id allocator, one per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sequence {
    last: u64,
}

impl Sequence {
    pub fn next<T: From<u64>>(&mut self) -> T {
        self.last += 1;
        T::from(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_one_and_increments() {
        let mut seq = Sequence::default();
        let first: DocumentId = seq.next();
        let second: DocumentId = seq.next();
        assert_eq!(first, DocumentId(1));
        assert_eq!(second, DocumentId(2));
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&CategoryId(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(ProcedureId(3).to_string(), "3");
    }
}
