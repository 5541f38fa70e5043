//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (tenant-scoped)
//!   ↓
//! 2. Rehydrate the aggregate from history
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed envelopes (best-effort)
//! ```
//!
//! Step 4 is the per-entity optimistic lock: if another writer committed to
//! the stream between 1 and 4 the append is refused and the caller gets
//! `DomainError::ConcurrentModification`. Nothing is written in that case, so
//! a transition is never partially applied.
//!
//! Step 5 happens strictly after the append. A publication failure is logged
//! and does not fail the call; the transition is already committed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use tradedesk_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use tradedesk_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic business failure, including optimistic-lock conflicts.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// A loaded stream mixed tenants or aggregates.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    /// Historical payloads no longer match the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => {
                DispatchError::Domain(DomainError::concurrent_modification(msg))
            }
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Result of a successful dispatch: the aggregate after the new events and
/// the events as committed (empty for an idempotent no-op).
#[derive(Debug)]
pub struct Dispatched<A> {
    pub aggregate: A,
    pub committed: Vec<StoredEvent>,
}

impl<A> Dispatched<A> {
    pub fn is_noop(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn envelopes(&self) -> Vec<EventEnvelope<JsonValue>> {
        self.committed.iter().map(StoredEvent::to_envelope).collect()
    }
}

/// Reusable command execution engine over an [`EventStore`] and an [`EventBus`].
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without handling anything.
    ///
    /// Returns the empty aggregate when the stream does not exist.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Run a command through the full pipeline.
    ///
    /// `tenant_id` is the stream owner. `make_aggregate` builds the empty
    /// aggregate that history is applied to.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        info!(
            tenant_id = %tenant_id,
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            version = aggregate.version(),
            "transition committed"
        );

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }

        Ok(Dispatched {
            aggregate,
            committed,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tradedesk_auth::Actor;
    use tradedesk_core::AggregateRoot;
    use tradedesk_events::InMemoryEventBus;
    use tradedesk_leads::lead::AGGREGATE_TYPE;
    use tradedesk_leads::{ContactLead, CreateLead, Lead, LeadCommand, LeadId, LeadStatus};

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn create(seller: TenantId, lead_id: LeadId) -> LeadCommand {
        LeadCommand::CreateLead(CreateLead {
            tenant_id: seller,
            lead_id,
            buyer_email: "buyer@example.com".to_string(),
            details: "500 pallets".to_string(),
            parent_id: None,
            occurred_at: Utc::now(),
        })
    }

    fn contact(seller: TenantId, lead_id: LeadId) -> LeadCommand {
        LeadCommand::ContactLead(ContactLead {
            tenant_id: seller,
            lead_id,
            actor: Actor::seller(seller),
            occurred_at: Utc::now(),
        })
    }

    fn make(_: TenantId, id: AggregateId) -> Lead {
        Lead::empty(LeadId::new(id))
    }

    #[test]
    fn dispatch_commits_publishes_and_returns_current_state() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus);
        let seller = TenantId::new();
        let lead_id = LeadId::new(AggregateId::new());

        dispatcher
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, create(seller, lead_id), make)
            .unwrap();
        let out = dispatcher
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, contact(seller, lead_id), make)
            .unwrap();

        assert_eq!(out.aggregate.status(), LeadStatus::Contacted);
        assert_eq!(out.aggregate.version(), 2);
        assert_eq!(out.committed[0].sequence_number, 2);

        let published = sub.drain();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].event_type(), "leads.lead.contacted");
    }

    #[test]
    fn domain_rejection_writes_nothing() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus);
        let seller = TenantId::new();
        let lead_id = LeadId::new(AggregateId::new());
        dispatcher
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, create(seller, lead_id), make)
            .unwrap();

        let stranger = TenantId::new();
        let cmd = LeadCommand::ContactLead(ContactLead {
            tenant_id: seller,
            lead_id,
            actor: Actor::seller(stranger),
            occurred_at: Utc::now(),
        });
        let err = dispatcher
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, cmd, make)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Domain(DomainError::AuthorizationDenied(_))));
        assert_eq!(dispatcher.store().load_stream(seller, lead_id.0).unwrap().len(), 1);
    }

    /// Serves a stream that is one event behind, as a concurrent writer would leave it.
    struct StaleReads(Arc<InMemoryEventStore>);

    impl EventStore for StaleReads {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.0.append(events, expected_version)
        }

        fn load_stream(
            &self,
            tenant_id: TenantId,
            aggregate_id: AggregateId,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            let mut stream = self.0.load_stream(tenant_id, aggregate_id)?;
            stream.pop();
            Ok(stream)
        }

        fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.0.load_by_type(aggregate_type)
        }
    }

    #[test]
    fn stale_version_surfaces_as_concurrent_modification() {
        let inner = Arc::new(InMemoryEventStore::new());
        let seller = TenantId::new();
        let lead_id = LeadId::new(AggregateId::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let seed = CommandDispatcher::new(inner.clone(), bus.clone());
        seed.dispatch(seller, lead_id.0, AGGREGATE_TYPE, create(seller, lead_id), make)
            .unwrap();
        seed.dispatch(seller, lead_id.0, AGGREGATE_TYPE, contact(seller, lead_id), make)
            .unwrap();

        let racing = CommandDispatcher::new(StaleReads(inner), bus);
        let err = racing
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, contact(seller, lead_id), make)
            .unwrap_err();

        match err {
            DispatchError::Domain(e) => assert!(e.is_retryable()),
            other => panic!("Expected ConcurrentModification, got {other:?}"),
        }
    }

    struct DownBus;

    impl EventBus<EventEnvelope<JsonValue>> for DownBus {
        type Error = String;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("bus offline".to_string())
        }

        fn subscribe(&self) -> tradedesk_events::Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            tradedesk_events::Subscription::new(rx)
        }
    }

    #[test]
    fn publication_failure_does_not_fail_committed_transition() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), DownBus);
        let seller = TenantId::new();
        let lead_id = LeadId::new(AggregateId::new());

        let out = dispatcher
            .dispatch(seller, lead_id.0, AGGREGATE_TYPE, create(seller, lead_id), make)
            .unwrap();

        assert_eq!(out.committed.len(), 1);
        assert_eq!(dispatcher.store().load_stream(seller, lead_id.0).unwrap().len(), 1);
    }
}
