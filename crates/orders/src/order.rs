use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradedesk_auth::{Actor, Requirement, ResourceOwners, Side, authorize};
use tradedesk_core::{
    AddressId, Aggregate, AggregateId, AggregateRoot, Currency, DomainError, SkuId, TenantId,
};
use tradedesk_events::Event;
use tradedesk_pricing::PriceTierId;
use tradedesk_quotes::{QuoteId, QuoteItem};

use crate::shipment::ShipmentAdvice;

/// Purchase order identifier (streams are owned by the order's seller).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

/// Aggregate type tag of purchase order streams.
pub const AGGREGATE_TYPE: &str = "orders.order";

const QUOTE_ORDER_NAMESPACE: Uuid = Uuid::from_u128(0x6f72_6465_7273_2d66_726f_6d2d_7175_6f74);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The one order id a quote can ever produce. Acceptance, retries and the
    /// repair job all derive the same id, so a second order is impossible.
    pub fn for_quote(quote_id: QuoteId) -> Self {
        Self(AggregateId::derived(&QUOTE_ORDER_NAMESPACE, quote_id.0))
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Placed | OrderStatus::Confirmed)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quoteId", rename_all = "snake_case")]
pub enum OrderSource {
    Quote(QuoteId),
    /// Direct checkout; no linked quote.
    Direct,
}

impl OrderSource {
    pub fn quote_id(&self) -> Option<QuoteId> {
        match self {
            OrderSource::Quote(id) => Some(*id),
            OrderSource::Direct => None,
        }
    }
}

/// An ordered line: the agreed price and quantity, frozen at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub line_no: u32,
    pub sku_id: SkuId,
    pub quantity: u32,
    /// Smallest currency unit.
    pub unit_price: u64,
    pub tier_id: Option<PriceTierId>,
    pub seller_notes: Option<String>,
}

impl From<&QuoteItem> for OrderLine {
    fn from(item: &QuoteItem) -> Self {
        Self {
            line_no: item.line_no,
            sku_id: item.sku_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            tier_id: item.tier_id,
            seller_notes: item.seller_notes.clone(),
        }
    }
}

/// Who cancelled an order and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub side: Side,
    pub reason: String,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: OrderId,
    tenant_id: Option<TenantId>,
    buyer_id: Option<TenantId>,
    number: String,
    source: OrderSource,
    lines: Vec<OrderLine>,
    shipping_cost: u64,
    currency: Option<Currency>,
    destination_id: Option<AddressId>,
    status: OrderStatus,
    status_history: Vec<OrderStatus>,
    shipment: Option<ShipmentAdvice>,
    cancellation: Option<Cancellation>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            buyer_id: None,
            number: String::new(),
            source: OrderSource::Direct,
            lines: Vec::new(),
            shipping_cost: 0,
            currency: None,
            destination_id: None,
            status: OrderStatus::Placed,
            status_history: Vec::new(),
            shipment: None,
            cancellation: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn seller_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn buyer_id(&self) -> Option<TenantId> {
        self.buyer_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn source(&self) -> OrderSource {
        self.source
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping_cost(&self) -> u64 {
        self.shipping_cost
    }

    pub fn currency(&self) -> Option<Currency> {
        self.currency
    }

    pub fn destination_id(&self) -> Option<AddressId> {
        self.destination_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[OrderStatus] {
        &self.status_history
    }

    pub fn shipment(&self) -> Option<&ShipmentAdvice> {
        self.shipment.as_ref()
    }

    pub fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Lines total plus shipping, in the smallest currency unit.
    pub fn total(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| l.unit_price.saturating_mul(u64::from(l.quantity)))
            .fold(self.shipping_cost, u64::saturating_add)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub number: String,
    pub buyer_id: TenantId,
    pub source: OrderSource,
    pub lines: Vec<OrderLine>,
    pub shipping_cost: u64,
    pub currency: Currency,
    pub destination_id: AddressId,
    /// Seller storefront confirms without a manual step.
    pub auto_accept: bool,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachShipmentAdvice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachShipmentAdvice {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub advice: ShipmentAdvice,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder. Uses `advice` if given, else the attached one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub advice: Option<ShipmentAdvice>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmDelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDelivery {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    PlaceOrder(PlaceOrder),
    ConfirmOrder(ConfirmOrder),
    AttachShipmentAdvice(AttachShipmentAdvice),
    ShipOrder(ShipOrder),
    ConfirmDelivery(ConfirmDelivery),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub number: String,
    pub buyer_id: TenantId,
    pub source: OrderSource,
    pub lines: Vec<OrderLine>,
    pub shipping_cost: u64,
    pub currency: Currency,
    pub destination_id: AddressId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub by: Side,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentAdviceAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentAdviceAttached {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub advice: ShipmentAdvice,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub advice: ShipmentAdvice,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub by: Side,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub cancellation: Cancellation,
    pub cancelled_from: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    OrderPlaced(OrderPlaced),
    OrderConfirmed(OrderConfirmed),
    ShipmentAdviceAttached(ShipmentAdviceAttached),
    OrderShipped(OrderShipped),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::OrderPlaced(_) => "orders.order.placed",
            PurchaseOrderEvent::OrderConfirmed(_) => "orders.order.confirmed",
            PurchaseOrderEvent::ShipmentAdviceAttached(_) => "orders.order.shipment_advice_attached",
            PurchaseOrderEvent::OrderShipped(_) => "orders.order.shipped",
            PurchaseOrderEvent::OrderDelivered(_) => "orders.order.delivered",
            PurchaseOrderEvent::OrderCancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::OrderPlaced(e) => e.occurred_at,
            PurchaseOrderEvent::OrderConfirmed(e) => e.occurred_at,
            PurchaseOrderEvent::ShipmentAdviceAttached(e) => e.occurred_at,
            PurchaseOrderEvent::OrderShipped(e) => e.occurred_at,
            PurchaseOrderEvent::OrderDelivered(e) => e.occurred_at,
            PurchaseOrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.buyer_id = Some(e.buyer_id);
                self.number = e.number.clone();
                self.source = e.source;
                self.lines = e.lines.clone();
                self.shipping_cost = e.shipping_cost;
                self.currency = Some(e.currency);
                self.destination_id = Some(e.destination_id);
                self.status = OrderStatus::Placed;
                self.status_history = vec![OrderStatus::Placed];
                self.created = true;
            }
            PurchaseOrderEvent::OrderConfirmed(_) => self.enter(OrderStatus::Confirmed),
            PurchaseOrderEvent::ShipmentAdviceAttached(e) => {
                self.shipment = Some(e.advice.clone());
            }
            PurchaseOrderEvent::OrderShipped(e) => {
                self.shipment = Some(e.advice.clone());
                self.enter(OrderStatus::Shipped);
            }
            PurchaseOrderEvent::OrderDelivered(_) => self.enter(OrderStatus::Delivered),
            PurchaseOrderEvent::OrderCancelled(e) => {
                self.cancellation = Some(e.cancellation.clone());
                self.enter(OrderStatus::Cancelled);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            PurchaseOrderCommand::ConfirmOrder(cmd) => self.handle_confirm(cmd),
            PurchaseOrderCommand::AttachShipmentAdvice(cmd) => self.handle_attach_advice(cmd),
            PurchaseOrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            PurchaseOrderCommand::ConfirmDelivery(cmd) => self.handle_deliver(cmd),
            PurchaseOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseOrder {
    fn enter(&mut self, status: OrderStatus) {
        self.status = status;
        self.status_history.push(status);
    }

    fn ensure_exists(&self, tenant_id: TenantId, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[OrderStatus], requested: OrderStatus) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::transition(self.status.as_str(), requested.as_str()));
        }
        Ok(())
    }

    fn authorize(&self, actor: &Actor, required: Requirement) -> Result<Side, DomainError> {
        let seller = self.tenant_id.ok_or(DomainError::NotFound)?;
        Ok(authorize(
            actor,
            &ResourceOwners::new(seller, self.buyer_id),
            required,
        )?)
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("purchase order already exists"));
        }
        if cmd.buyer_id == cmd.tenant_id {
            return Err(DomainError::validation("seller and buyer must differ"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("order number is required"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }
        let mut seen = HashSet::new();
        for line in &cmd.lines {
            if !seen.insert(line.line_no) {
                return Err(DomainError::validation(format!(
                    "duplicate line number {}",
                    line.line_no
                )));
            }
            if line.quantity == 0 || line.unit_price == 0 {
                return Err(DomainError::validation(format!(
                    "line {} needs a positive quantity and price",
                    line.line_no
                )));
            }
        }
        authorize(
            &cmd.actor,
            &ResourceOwners::new(cmd.tenant_id, Some(cmd.buyer_id)),
            Requirement::PartyOrSystem,
        )?;

        let mut events = vec![PurchaseOrderEvent::OrderPlaced(OrderPlaced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            number: cmd.number.clone(),
            buyer_id: cmd.buyer_id,
            source: cmd.source,
            lines: cmd.lines.clone(),
            shipping_cost: cmd.shipping_cost,
            currency: cmd.currency,
            destination_id: cmd.destination_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })];
        if cmd.auto_accept {
            events.push(PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                by: Side::System,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Placed], OrderStatus::Confirmed)?;
        let by = self.authorize(&cmd.actor, Requirement::SellerOnly)?;

        Ok(vec![PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_advice(
        &self,
        cmd: &AttachShipmentAdvice,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if !self.status.is_cancellable() {
            return Err(DomainError::invariant(format!(
                "shipment advice cannot be attached to a {} order",
                self.status.as_str()
            )));
        }
        self.authorize(&cmd.actor, Requirement::SellerOnly)?;
        cmd.advice.validate()?;

        Ok(vec![PurchaseOrderEvent::ShipmentAdviceAttached(
            ShipmentAdviceAttached {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                advice: cmd.advice.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Confirmed], OrderStatus::Shipped)?;
        self.authorize(&cmd.actor, Requirement::SellerOnly)?;

        let advice = cmd
            .advice
            .clone()
            .or_else(|| self.shipment.clone())
            .ok_or_else(|| DomainError::validation("shipping requires a shipment advice"))?;
        advice.validate()?;

        Ok(vec![PurchaseOrderEvent::OrderShipped(OrderShipped {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            advice,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &ConfirmDelivery) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Shipped], OrderStatus::Delivered)?;
        let by = self.authorize(&cmd.actor, Requirement::PartyOrSystem)?;

        Ok(vec![PurchaseOrderEvent::OrderDelivered(OrderDelivered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(
            &[OrderStatus::Placed, OrderStatus::Confirmed],
            OrderStatus::Cancelled,
        )?;
        let side = self.authorize(&cmd.actor, Requirement::EitherParty)?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a cancellation reason is required"));
        }

        Ok(vec![PurchaseOrderEvent::OrderCancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            cancellation: Cancellation {
                side,
                reason: reason.to_string(),
            },
            cancelled_from: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
