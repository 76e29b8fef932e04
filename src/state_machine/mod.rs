mod association;
mod semantics;
mod state;

pub use association::{Milestones, PermitAssociation};
pub use semantics::{CategorySemantic, DateTrigger, date_trigger, status_trigger};
pub use state::{PermitStatus, StateMachine, Transition};
