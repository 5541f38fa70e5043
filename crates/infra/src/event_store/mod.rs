//! Append-only event store boundary.
//!
//! Streams are keyed by `(owner tenant, aggregate id)`. Negotiation documents
//! (leads, quotes, orders) are owned by the seller tenant. The trait makes no
//! storage assumptions; the in-memory implementation backs tests and the
//! single-process daemon.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
