//! `tradedesk-workflow`: the negotiation engine exposed to callers.
//!
//! Orchestrates the lead, quote and order state machines over the shared
//! event store, resolves marketplace policy and prices, notifies the
//! counter-party of every transition and runs the background expiry sweep
//! and repair job.

pub mod engine;
pub mod error;
pub mod outbox;
pub mod repair;
pub mod requests;
pub mod sweeper;

pub use engine::{Collaborators, EnvelopeBus, WorkflowEngine};
pub use error::{ErrorKind, WorkflowError, WorkflowResult};
pub use outbox::{DEAD_LETTER_CAPACITY, FlushReport, NotificationOutbox, OutboxEntry};
pub use repair::{RepairReport, spawn_repair_job};
pub use requests::{
    Cart, LeadAction, LinePrice, LineRequest, OrderAction, PriceSource, QuoteRequest, QuoteResponse,
};
pub use sweeper::{SweepReport, spawn_expiry_sweeper};
