//! The permit procedure engine.
//!
//! [`Engine`] owns the record tables behind a single mutex and talks to a
//! [`FileStorage`] for bytes and a [`Directory`] for display names. Every
//! read-modify-write of a permit association (status escalation, date
//! stamping, recompute) happens while that mutex is held, so concurrent
//! uploads against the same procedure cannot lose an escalation.
//!
//! Storage calls are awaited with the lock released. Metadata is committed
//! only after the bytes are stored; a crash in between leaves an orphaned
//! file, never a row pointing at nothing.

mod documents;
mod overview;
mod payments;
mod procedures;
mod tables;
mod taxonomy;

pub use documents::Restamp;
pub use overview::{DocumentView, PaymentView, PermitView, ProcedureOverview, ProcedureSummary};
pub use payments::parse_amount;
pub use tables::Tables;
pub use taxonomy::{DEFAULT_CATEGORIES, SERVICE_PAYMENT_CATEGORY};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::directory::{Directory, StaticDirectory};
use crate::error::EngineError;
use crate::state_machine::PermitStatus;
use crate::storage::FileStorage;

/// Source of "today" and "now".
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck on one day, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn now(&self) -> DateTime<Utc> {
        self.0.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc()
    }
}

/// Outcome of one item in a best-effort batch.
///
/// Batches never roll back: a failed item is reported here and its
/// siblings still go through.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Succeeded {
        index: usize,
        value: T,
    },
    Failed {
        index: usize,
        kind: crate::error::ErrorKind,
        error: String,
    },
    /// The item carried nothing to do (e.g. a voucher with no amount).
    Skipped { index: usize },
}

impl<T> ItemOutcome<T> {
    pub fn from_result(index: usize, result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => ItemOutcome::Succeeded { index, value },
            Err(err) => {
                tracing::warn!(index, error = %err, "Batch item skipped");
                ItemOutcome::Failed {
                    index,
                    kind: err.kind(),
                    error: err.to_string(),
                }
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ItemOutcome::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

pub struct Engine<S, D = StaticDirectory> {
    tables: Mutex<Tables>,
    storage: S,
    directory: D,
    clock: Arc<dyn Clock>,
    default_status: PermitStatus,
}

impl<S: FileStorage, D: Directory> Engine<S, D> {
    pub fn new(storage: S, directory: D) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            storage,
            directory,
            clock: Arc::new(SystemClock),
            default_status: PermitStatus::Pending,
        }
    }

    /// Restore from a snapshot.
    pub fn with_tables(mut self, tables: Tables) -> Self {
        self.tables = Mutex::new(tables);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Status given to newly attached permit types when the caller does not
    /// pick one.
    pub fn with_default_status(mut self, status: PermitStatus) -> Self {
        self.default_status = status;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Copy of the current tables, ready to be written out.
    pub fn snapshot(&self) -> Tables {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Remove stored bytes, tolerating objects that are already gone.
    async fn discard_file(&self, path: &str) -> Result<(), EngineError> {
        if !self.storage.exists(path).await? {
            tracing::warn!(path, "Stored file already missing");
            return Ok(());
        }
        self.storage.delete(path).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{NewProcedure, PermitAttachment, PermitTypeId, ProcedureId};
    use crate::storage::MemoryStorage;

    pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn engine_on(today: NaiveDate) -> Engine<MemoryStorage> {
        Engine::new(MemoryStorage::new(), StaticDirectory::default())
            .with_clock(Arc::new(FixedClock(today)))
    }

    pub fn engine() -> Engine<MemoryStorage> {
        engine_on(day(2024, 3, 15))
    }

    /// A procedure with the given permit types attached, in order.
    pub fn procedure_with(
        engine: &Engine<MemoryStorage>,
        permits: &[&str],
    ) -> (ProcedureId, Vec<PermitTypeId>) {
        let procedure = engine
            .create_procedure(NewProcedure {
                shipment_ref: "C-17".into(),
                client_ref: "CL-3".into(),
                entity_ref: "ISP".into(),
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<PermitTypeId> = permits
            .iter()
            .map(|name| engine.register_permit_type(name).unwrap().id)
            .collect();
        let attachments = ids.iter().copied().map(PermitAttachment::new).collect();
        engine.attach_permit_types(procedure.id, attachments).unwrap();
        (procedure.id, ids)
    }
}
