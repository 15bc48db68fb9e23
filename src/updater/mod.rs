//! Oracle update workflow
//!
//! Payload construction, the balance gate, submission and the orchestrator
//! sequencing one update cycle.

pub mod balance;
mod orchestrator;
pub mod payload;
mod submitter;

pub use balance::{check_sufficient, BalanceGuard};
pub use orchestrator::{
    Confirmation, CycleFailure, CycleOutcome, CycleReport, CycleSettings, CycleState, SkipReason,
    UpdateOrchestrator,
};
pub use payload::{
    QueryIdSource, RandomQueryIds, SequentialQueryIds, UpdatePayloadBuilder, OP_UPDATE_PRICE,
};
pub use submitter::{SubmitFailure, SubmitReceipt, TransactionSubmitter};
