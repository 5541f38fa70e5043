//! Read models folded from committed envelopes.
//!
//! Every board keeps the latest snapshot of each document, keyed by owner
//! tenant. Boards are:
//! - **Rebuildable** from the event store (`rebuild`)
//! - **Tenant-partitioned** through [`TenantStore`](crate::read_model::TenantStore)
//! - **Idempotent**: an envelope at or below the snapshot version is skipped

pub mod board;
pub mod leads;
pub mod orders;
pub mod quotes;

pub use board::{Board, Projected, ProjectionError};
pub use leads::LeadBoard;
pub use orders::OrderBoard;
pub use quotes::QuoteBoard;
