use chrono::{DateTime, Utc};

use tradedesk_core::{AggregateId, TenantId};
use tradedesk_quotes::{Quote, QuoteId, QuoteStatus, quote};

use super::board::{Board, Projected};

impl Projected for Quote {
    const AGGREGATE_TYPE: &'static str = quote::AGGREGATE_TYPE;

    fn empty_snapshot(id: AggregateId) -> Self {
        Quote::empty(QuoteId::new(id))
    }
}

/// Latest state of every quote, partitioned by owning seller.
pub type QuoteBoard = Board<Quote>;

impl QuoteBoard {
    /// Non-terminal quotes whose expiry is at or before `now`.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<(TenantId, Quote)> {
        let mut found = self.scan(&|q: &Quote| q.is_expired_at(now));
        found.sort_by_key(|(_, q)| q.expires_at());
        found
    }

    /// Accepted quotes that never got their order linked.
    pub fn accepted_without_order(&self) -> Vec<(TenantId, Quote)> {
        self.scan(&|q: &Quote| q.status() == QuoteStatus::Accepted && q.order_id().is_none())
    }

    /// Quotes a buyer is party to, across sellers.
    pub fn for_buyer(&self, buyer_id: TenantId) -> Vec<(TenantId, Quote)> {
        self.scan(&|q: &Quote| q.buyer_id() == Some(buyer_id))
    }
}
