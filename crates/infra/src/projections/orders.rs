use tradedesk_core::{AggregateId, TenantId};
use tradedesk_orders::{OrderId, OrderStatus, PurchaseOrder, order};
use tradedesk_quotes::QuoteId;

use super::board::{Board, Projected};

impl Projected for PurchaseOrder {
    const AGGREGATE_TYPE: &'static str = order::AGGREGATE_TYPE;

    fn empty_snapshot(id: AggregateId) -> Self {
        PurchaseOrder::empty(OrderId::new(id))
    }
}

/// Latest state of every purchase order, partitioned by owning seller.
pub type OrderBoard = Board<PurchaseOrder>;

impl OrderBoard {
    /// The order created from `quote_id`, if it has been placed.
    pub fn for_quote(&self, quote_id: QuoteId) -> Option<(TenantId, PurchaseOrder)> {
        self.scan(&|o: &PurchaseOrder| o.source().quote_id() == Some(quote_id))
            .into_iter()
            .next()
    }

    /// Orders the seller still has to act on (placed or confirmed).
    pub fn open(&self, seller_id: TenantId) -> Vec<PurchaseOrder> {
        self.list(seller_id)
            .into_iter()
            .filter(|o| matches!(o.status(), OrderStatus::Placed | OrderStatus::Confirmed))
            .collect()
    }
}
