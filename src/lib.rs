//! Customs permit procedure engine.
//!
//! Tracks permit procedures (trámites) for cargo shipments: the documents
//! filed under each attached permit type, the automatic status escalation
//! and duration tracking those documents drive, and the payment records
//! and fee receipts reconciled alongside them.

pub mod cli;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod snapshot;
pub mod state_machine;
pub mod storage;
pub mod ui;

pub use engine::{Clock, Engine, FixedClock, ItemOutcome, SystemClock};
pub use error::{EngineError, ErrorKind, Result};
pub use orchestrator::{SaveAllReport, SaveAllRequest, SaveOrchestrator};
