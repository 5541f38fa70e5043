use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

use tradedesk_core::{Aggregate, AggregateId, TenantId};
use tradedesk_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// An aggregate whose snapshots a [`Board`] can maintain.
pub trait Projected: Aggregate + Clone + Send + Sync + 'static {
    /// Stream tag the board listens to.
    const AGGREGATE_TYPE: &'static str;

    fn empty_snapshot(id: AggregateId) -> Self;
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: &'static str,
        message: String,
    },
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("rebuild failed: {0}")]
    Store(#[from] EventStoreError),
}

/// Snapshot read model for one aggregate type.
///
/// The snapshot's own version doubles as the projection cursor: stream
/// sequence numbers start at 1 and the aggregate adds one per applied event,
/// so `version == last applied sequence`.
#[derive(Debug)]
pub struct Board<A, S = InMemoryTenantStore<AggregateId, A>> {
    store: S,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Default for Board<A> {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<A, S> Board<A, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }
}

impl<A, S> Board<A, S>
where
    A: Projected,
    A::Event: DeserializeOwned,
    S: TenantStore<AggregateId, A>,
{
    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    /// Resolve the owning tenant of a document known only by id.
    pub fn owner_of(&self, id: AggregateId) -> Option<TenantId> {
        self.store.find(&id).map(|(tenant, _)| tenant)
    }

    pub(crate) fn scan(&self, pred: &dyn Fn(&A) -> bool) -> Vec<(TenantId, A)> {
        self.store.scan(pred)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut snapshot = self
            .store
            .get(tenant_id, &aggregate_id)
            .unwrap_or_else(|| A::empty_snapshot(aggregate_id));
        let last = snapshot.version();

        if seq <= last {
            debug!(%aggregate_id, seq, last, "duplicate envelope skipped");
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: A::Event = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: A::AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;
        snapshot.apply(&ev);
        self.store.upsert(tenant_id, aggregate_id, snapshot);
        Ok(())
    }

    /// Fold `envelope`; if the board has missed earlier events of that
    /// stream, reload the whole stream from `events` instead.
    ///
    /// Gaps appear when another writer shares the store or when two callers
    /// fold their envelopes out of commit order.
    pub fn apply_or_catch_up<E: EventStore + ?Sized>(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        events: &E,
    ) -> Result<(), ProjectionError> {
        match self.apply_envelope(envelope) {
            Err(ProjectionError::NonMonotonicSequence { last, found }) => {
                info!(
                    aggregate_id = %envelope.aggregate_id(),
                    last,
                    found,
                    "board behind its stream; catching up from the store"
                );
                self.catch_up(events, envelope.tenant_id(), envelope.aggregate_id())
                    .map(|_| ())
            }
            other => other,
        }
    }

    /// Fold every stored event of one stream not yet on the board.
    pub fn catch_up<E: EventStore + ?Sized>(
        &self,
        events: &E,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<usize, ProjectionError> {
        let stored = events.load_stream(tenant_id, aggregate_id)?;
        for e in &stored {
            self.apply_envelope(&e.to_envelope())?;
        }
        Ok(stored.len())
    }

    pub fn apply_all<'a>(
        &self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        for envelope in envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }

    /// Replay every stream of this aggregate type from `events`.
    ///
    /// Snapshots already up to date are left alone, so this is safe to run
    /// against a live board.
    pub fn rebuild<E: EventStore + ?Sized>(&self, events: &E) -> Result<usize, ProjectionError> {
        let stored = events.load_by_type(A::AGGREGATE_TYPE)?;
        for e in &stored {
            self.apply_envelope(&e.to_envelope())?;
        }
        Ok(stored.len())
    }
}
