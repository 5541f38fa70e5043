use tradedesk_core::{AggregateId, TenantId};
use tradedesk_leads::{Lead, LeadId, LeadStatus, lead};

use super::board::{Board, Projected};

impl Projected for Lead {
    const AGGREGATE_TYPE: &'static str = lead::AGGREGATE_TYPE;

    fn empty_snapshot(id: AggregateId) -> Self {
        Lead::empty(LeadId::new(id))
    }
}

/// Latest state of every lead, partitioned by owning seller.
pub type LeadBoard = Board<Lead>;

impl LeadBoard {
    /// Child leads fanned out from `parent`, whichever seller owns them.
    pub fn children_of(&self, parent: LeadId) -> Vec<(TenantId, Lead)> {
        self.scan(&|l: &Lead| l.parent_id() == Some(parent))
    }

    /// Forwarded leads across all sellers.
    pub fn forwarded(&self) -> Vec<(TenantId, Lead)> {
        self.scan(&|l: &Lead| l.status() == LeadStatus::Forwarded)
    }

    /// Converted leads across all sellers.
    pub fn converted(&self) -> Vec<(TenantId, Lead)> {
        self.scan(&|l: &Lead| l.status() == LeadStatus::Converted)
    }

    pub fn with_status(&self, seller_id: TenantId, status: LeadStatus) -> Vec<Lead> {
        self.list(seller_id)
            .into_iter()
            .filter(|l| l.status() == status)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::Value as JsonValue;
    use tradedesk_auth::Actor;
    use tradedesk_core::AggregateRoot;
    use tradedesk_events::{EventEnvelope, InMemoryEventBus};
    use tradedesk_leads::{ContactLead, CreateLead, LeadCommand, QualifyLead};

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;
    use crate::projections::ProjectionError;

    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn create(d: &Dispatcher, seller: TenantId, parent: Option<LeadId>) -> (LeadId, Vec<EventEnvelope<JsonValue>>) {
        let lead_id = LeadId::new(AggregateId::new());
        let out = d
            .dispatch(
                seller,
                lead_id.0,
                lead::AGGREGATE_TYPE,
                LeadCommand::CreateLead(CreateLead {
                    tenant_id: seller,
                    lead_id,
                    buyer_email: "ops@buyer.example".to_string(),
                    details: "cold-chain pallets".to_string(),
                    parent_id: parent,
                    occurred_at: Utc::now(),
                }),
                |_, id| Lead::empty(LeadId::new(id)),
            )
            .unwrap();
        (lead_id, out.envelopes())
    }

    #[test]
    fn board_follows_transitions_and_resolves_owner() {
        let d = dispatcher();
        let board = LeadBoard::default();
        let seller = TenantId::new();
        let (lead_id, created) = create(&d, seller, None);
        board.apply_all(&created).unwrap();

        let contacted = d
            .dispatch(
                seller,
                lead_id.0,
                lead::AGGREGATE_TYPE,
                LeadCommand::ContactLead(ContactLead {
                    tenant_id: seller,
                    lead_id,
                    actor: Actor::seller(seller),
                    occurred_at: Utc::now(),
                }),
                |_, id| Lead::empty(LeadId::new(id)),
            )
            .unwrap()
            .envelopes();
        board.apply_all(&contacted).unwrap();
        board.apply_all(&contacted).unwrap();

        let snapshot = board.get(seller, lead_id.0).unwrap();
        assert_eq!(snapshot.status(), LeadStatus::Contacted);
        assert_eq!(board.owner_of(lead_id.0), Some(seller));
        assert_eq!(board.with_status(seller, LeadStatus::Contacted).len(), 1);
        assert!(board.get(TenantId::new(), lead_id.0).is_none());
    }

    #[test]
    fn children_are_found_across_sellers() {
        let d = dispatcher();
        let board = LeadBoard::default();
        let (parent, envs) = create(&d, TenantId::new(), None);
        board.apply_all(&envs).unwrap();
        let other = TenantId::new();
        let (child, envs) = create(&d, other, Some(parent));
        board.apply_all(&envs).unwrap();

        let children = board.children_of(parent);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, other);
        assert_eq!(children[0].1.parent_id(), Some(parent));
        assert_eq!(children[0].1.id_typed(), child);
    }

    #[test]
    fn rebuild_replays_the_store() {
        let d = dispatcher();
        let seller = TenantId::new();
        let (lead_id, _) = create(&d, seller, None);

        let board = LeadBoard::default();
        assert_eq!(board.rebuild(d.store()).unwrap(), 1);
        assert_eq!(board.get(seller, lead_id.0).unwrap().status(), LeadStatus::New);
    }

    #[test]
    fn board_that_missed_events_catches_up_from_the_store() {
        let d = dispatcher();
        let board = LeadBoard::default();
        let seller = TenantId::new();
        let (lead_id, created) = create(&d, seller, None);
        board.apply_all(&created).unwrap();

        let actor = Actor::seller(seller);
        let step = |cmd: LeadCommand| {
            d.dispatch(seller, lead_id.0, lead::AGGREGATE_TYPE, cmd, |_, id| {
                Lead::empty(LeadId::new(id))
            })
            .unwrap()
            .envelopes()
        };
        // Committed by another writer; never folded here.
        step(LeadCommand::ContactLead(ContactLead {
            tenant_id: seller,
            lead_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        }));
        let qualified = step(LeadCommand::QualifyLead(QualifyLead {
            tenant_id: seller,
            lead_id,
            actor,
            occurred_at: Utc::now(),
        }));

        assert!(matches!(
            board.apply_envelope(&qualified[0]),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
        board.apply_or_catch_up(&qualified[0], d.store()).unwrap();

        let snapshot = board.get(seller, lead_id.0).unwrap();
        assert_eq!(snapshot.status(), LeadStatus::Qualified);
        assert_eq!(snapshot.version(), 3);
        board.apply_or_catch_up(&qualified[0], d.store()).unwrap();
        assert_eq!(board.get(seller, lead_id.0).unwrap().version(), 3);
    }
}
