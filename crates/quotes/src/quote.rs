use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradedesk_auth::{Actor, Requirement, ResourceOwners, Side, authorize};
use tradedesk_core::{
    AddressId, Aggregate, AggregateId, AggregateRoot, Currency, DomainError, StorefrontId, TenantId,
};
use tradedesk_events::Event;
use tradedesk_leads::LeadId;

use crate::item::{LineUpdate, QuoteItem, apply_updates, subtotal, validate_items};

/// Quote identifier (streams are owned by the quote's seller).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub AggregateId);

/// Aggregate type tag of quote streams.
pub const AGGREGATE_TYPE: &str = "quotes.quote";

const LEAD_QUOTE_NAMESPACE: Uuid = Uuid::from_u128(0x7175_6f74_652d_6672_6f6d_2d6c_6561_6473);

impl QuoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The quote a converted lead leads to; at most one per lead.
    pub fn for_lead(lead_id: LeadId) -> Self {
        Self(AggregateId::derived(&LEAD_QUOTE_NAMESPACE, lead_id.0))
    }
}

impl core::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Quote status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    Submitted,
    SellerReview,
    BuyerReview,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "DRAFT",
            QuoteStatus::Submitted => "SUBMITTED",
            QuoteStatus::SellerReview => "SELLER_REVIEW",
            QuoteStatus::BuyerReview => "BUYER_REVIEW",
            QuoteStatus::Accepted => "ACCEPTED",
            QuoteStatus::Rejected => "REJECTED",
            QuoteStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Accepted | QuoteStatus::Rejected | QuoteStatus::Expired
        )
    }

    pub fn is_under_review(&self) -> bool {
        matches!(self, QuoteStatus::SellerReview | QuoteStatus::BuyerReview)
    }

    /// The side whose move it is, if the quote is under review.
    pub fn awaiting(&self) -> Option<Side> {
        match self {
            QuoteStatus::SellerReview => Some(Side::Seller),
            QuoteStatus::BuyerReview => Some(Side::Buyer),
            _ => None,
        }
    }
}

impl core::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who rejected a quote and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub side: Side,
    pub reason: String,
}

/// Policy and association facts evaluated at submission time.
///
/// Resolved by the caller from the seller's effective policy and the
/// association store; the aggregate only decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionGates {
    pub association_active: bool,
    pub allow_associationless: bool,
    pub require_approval: bool,
    pub auto_approve: bool,
    /// Smallest currency unit; 0 disables the check.
    pub min_order_value: u64,
}

/// Aggregate root: Quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    id: QuoteId,
    tenant_id: Option<TenantId>,
    buyer_id: Option<TenantId>,
    number: String,
    storefront_id: Option<StorefrontId>,
    destination_id: Option<AddressId>,
    currency: Option<Currency>,
    lead_id: Option<LeadId>,
    items: Vec<QuoteItem>,
    shipping_cost: u64,
    revision: u32,
    status: QuoteStatus,
    status_history: Vec<QuoteStatus>,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    rejection: Option<Rejection>,
    order_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

impl Quote {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QuoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            buyer_id: None,
            number: String::new(),
            storefront_id: None,
            destination_id: None,
            currency: None,
            lead_id: None,
            items: Vec::new(),
            shipping_cost: 0,
            revision: 0,
            status: QuoteStatus::Draft,
            status_history: Vec::new(),
            created_at: None,
            expires_at: None,
            rejection: None,
            order_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuoteId {
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

    pub fn storefront_id(&self) -> Option<StorefrontId> {
        self.storefront_id
    }

    pub fn destination_id(&self) -> Option<AddressId> {
        self.destination_id
    }

    pub fn currency(&self) -> Option<Currency> {
        self.currency
    }

    pub fn lead_id(&self) -> Option<LeadId> {
        self.lead_id
    }

    pub fn items(&self) -> &[QuoteItem] {
        &self.items
    }

    pub fn shipping_cost(&self) -> u64 {
        self.shipping_cost
    }

    /// Number of counter-offers exchanged.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn status(&self) -> QuoteStatus {
        self.status
    }

    pub fn status_history(&self) -> &[QuoteStatus] {
        &self.status_history
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    /// Purchase order created from this quote, once linked.
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether the quote is overdue at `now` and still open.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at.is_some_and(|at| at <= now)
    }
}

impl AggregateRoot for Quote {
    type Id = QuoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub number: String,
    pub buyer_id: TenantId,
    pub storefront_id: Option<StorefrontId>,
    pub destination_id: AddressId,
    pub currency: Currency,
    pub lead_id: Option<LeadId>,
    pub expires_at: DateTime<Utc>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub items: Vec<QuoteItem>,
    pub shipping_cost: u64,
    pub gates: SubmissionGates,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CounterOffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterOffer {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub updates: Vec<LineUpdate>,
    pub shipping_cost: Option<u64>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireQuote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOrder {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub order_id: AggregateId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteCommand {
    CreateQuote(CreateQuote),
    SubmitQuote(SubmitQuote),
    CounterOffer(CounterOffer),
    AcceptQuote(AcceptQuote),
    RejectQuote(RejectQuote),
    ExpireQuote(ExpireQuote),
    LinkOrder(LinkOrder),
}

/// Event: QuoteCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCreated {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub number: String,
    pub buyer_id: TenantId,
    pub storefront_id: Option<StorefrontId>,
    pub destination_id: AddressId,
    pub currency: Currency,
    pub lead_id: Option<LeadId>,
    pub expires_at: DateTime<Utc>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmitted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub items: Vec<QuoteItem>,
    pub shipping_cost: u64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SellerReviewStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerReviewStarted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteCounterOffered. Carries the full item set after the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCounterOffered {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub by: Side,
    pub revision: u32,
    pub items: Vec<QuoteItem>,
    pub shipping_cost: u64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteAccepted. `items`/`shipping_cost` are the agreed terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteAccepted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub accepted_by: Side,
    pub revision: u32,
    pub items: Vec<QuoteItem>,
    pub shipping_cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRejected {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub rejection: Rejection,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteExpired {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub expired_from: QuoteStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuoteOrderLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteOrderLinked {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteEvent {
    QuoteCreated(QuoteCreated),
    QuoteSubmitted(QuoteSubmitted),
    SellerReviewStarted(SellerReviewStarted),
    QuoteCounterOffered(QuoteCounterOffered),
    QuoteAccepted(QuoteAccepted),
    QuoteRejected(QuoteRejected),
    QuoteExpired(QuoteExpired),
    QuoteOrderLinked(QuoteOrderLinked),
}

impl Event for QuoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuoteEvent::QuoteCreated(_) => "quotes.quote.created",
            QuoteEvent::QuoteSubmitted(_) => "quotes.quote.submitted",
            QuoteEvent::SellerReviewStarted(_) => "quotes.quote.seller_review_started",
            QuoteEvent::QuoteCounterOffered(_) => "quotes.quote.counter_offered",
            QuoteEvent::QuoteAccepted(_) => "quotes.quote.accepted",
            QuoteEvent::QuoteRejected(_) => "quotes.quote.rejected",
            QuoteEvent::QuoteExpired(_) => "quotes.quote.expired",
            QuoteEvent::QuoteOrderLinked(_) => "quotes.quote.order_linked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuoteEvent::QuoteCreated(e) => e.occurred_at,
            QuoteEvent::QuoteSubmitted(e) => e.occurred_at,
            QuoteEvent::SellerReviewStarted(e) => e.occurred_at,
            QuoteEvent::QuoteCounterOffered(e) => e.occurred_at,
            QuoteEvent::QuoteAccepted(e) => e.occurred_at,
            QuoteEvent::QuoteRejected(e) => e.occurred_at,
            QuoteEvent::QuoteExpired(e) => e.occurred_at,
            QuoteEvent::QuoteOrderLinked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quote {
    type Command = QuoteCommand;
    type Event = QuoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuoteEvent::QuoteCreated(e) => {
                self.id = e.quote_id;
                self.tenant_id = Some(e.tenant_id);
                self.buyer_id = Some(e.buyer_id);
                self.number = e.number.clone();
                self.storefront_id = e.storefront_id;
                self.destination_id = Some(e.destination_id);
                self.currency = Some(e.currency);
                self.lead_id = e.lead_id;
                self.created_at = Some(e.occurred_at);
                self.expires_at = Some(e.expires_at);
                self.status = QuoteStatus::Draft;
                self.status_history = vec![QuoteStatus::Draft];
                self.created = true;
            }
            QuoteEvent::QuoteSubmitted(e) => {
                self.items = e.items.clone();
                self.shipping_cost = e.shipping_cost;
                self.enter(QuoteStatus::Submitted);
            }
            QuoteEvent::SellerReviewStarted(_) => self.enter(QuoteStatus::SellerReview),
            QuoteEvent::QuoteCounterOffered(e) => {
                self.items = e.items.clone();
                self.shipping_cost = e.shipping_cost;
                self.revision = e.revision;
                let next = match e.by {
                    Side::Buyer => QuoteStatus::SellerReview,
                    _ => QuoteStatus::BuyerReview,
                };
                self.enter(next);
            }
            QuoteEvent::QuoteAccepted(e) => {
                self.items = e.items.clone();
                self.shipping_cost = e.shipping_cost;
                self.enter(QuoteStatus::Accepted);
            }
            QuoteEvent::QuoteRejected(e) => {
                self.rejection = Some(e.rejection.clone());
                self.enter(QuoteStatus::Rejected);
            }
            QuoteEvent::QuoteExpired(_) => self.enter(QuoteStatus::Expired),
            QuoteEvent::QuoteOrderLinked(e) => {
                self.order_id = Some(e.order_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuoteCommand::CreateQuote(cmd) => self.handle_create(cmd),
            QuoteCommand::SubmitQuote(cmd) => self.handle_submit(cmd),
            QuoteCommand::CounterOffer(cmd) => self.handle_counter(cmd),
            QuoteCommand::AcceptQuote(cmd) => self.handle_accept(cmd),
            QuoteCommand::RejectQuote(cmd) => self.handle_reject(cmd),
            QuoteCommand::ExpireQuote(cmd) => self.handle_expire(cmd),
            QuoteCommand::LinkOrder(cmd) => self.handle_link_order(cmd),
        }
    }
}

impl Quote {
    fn enter(&mut self, status: QuoteStatus) {
        self.status = status;
        self.status_history.push(status);
    }

    fn ensure_exists(&self, tenant_id: TenantId, quote_id: QuoteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != quote_id {
            return Err(DomainError::invariant("quote_id mismatch"));
        }
        Ok(())
    }

    fn owners(&self) -> Result<ResourceOwners, DomainError> {
        let seller = self.tenant_id.ok_or(DomainError::NotFound)?;
        Ok(ResourceOwners::new(seller, self.buyer_id))
    }

    fn authorize(&self, actor: &Actor, required: Requirement) -> Result<Side, DomainError> {
        Ok(authorize(actor, &self.owners()?, required)?)
    }

    /// Review moves belong to whichever side the quote is waiting on.
    fn ensure_turn(&self, side: Side, requested: QuoteStatus) -> Result<(), DomainError> {
        match self.status.awaiting() {
            None => Err(DomainError::transition(self.status.as_str(), requested.as_str())),
            Some(expected) if expected != side => Err(DomainError::denied(format!(
                "quote is awaiting the {} side",
                expected.as_str().to_lowercase()
            ))),
            Some(_) => Ok(()),
        }
    }

    fn handle_create(&self, cmd: &CreateQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("quote already exists"));
        }
        if cmd.buyer_id == cmd.tenant_id {
            return Err(DomainError::validation("seller and buyer must differ"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("quote number is required"));
        }
        if cmd.expires_at <= cmd.occurred_at {
            return Err(DomainError::validation("expiry must be after creation"));
        }
        authorize(
            &cmd.actor,
            &ResourceOwners::new(cmd.tenant_id, Some(cmd.buyer_id)),
            Requirement::EitherParty,
        )?;

        Ok(vec![QuoteEvent::QuoteCreated(QuoteCreated {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            number: cmd.number.clone(),
            buyer_id: cmd.buyer_id,
            storefront_id: cmd.storefront_id,
            destination_id: cmd.destination_id,
            currency: cmd.currency,
            lead_id: cmd.lead_id,
            expires_at: cmd.expires_at,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        if self.status != QuoteStatus::Draft {
            return Err(DomainError::transition(
                self.status.as_str(),
                QuoteStatus::Submitted.as_str(),
            ));
        }
        self.authorize(&cmd.actor, Requirement::BuyerOnly)?;

        let gates = cmd.gates;
        if !gates.association_active && !gates.allow_associationless {
            let buyer = self.buyer_id.ok_or(DomainError::NotFound)?;
            return Err(DomainError::association_required(cmd.tenant_id, buyer));
        }
        validate_items(&cmd.items)?;
        let value = subtotal(&cmd.items)?;
        if value < gates.min_order_value {
            return Err(DomainError::policy(format!(
                "order value {value} is below the minimum of {}",
                gates.min_order_value
            )));
        }

        let mut events = vec![QuoteEvent::QuoteSubmitted(QuoteSubmitted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            items: cmd.items.clone(),
            shipping_cost: cmd.shipping_cost,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })];

        let accepted = QuoteEvent::QuoteAccepted(QuoteAccepted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            accepted_by: Side::System,
            revision: self.revision,
            items: cmd.items.clone(),
            shipping_cost: cmd.shipping_cost,
            occurred_at: cmd.occurred_at,
        });

        if !gates.require_approval {
            events.push(accepted);
            return Ok(events);
        }

        events.push(QuoteEvent::SellerReviewStarted(SellerReviewStarted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        }));
        if gates.auto_approve {
            events.push(accepted);
        }
        Ok(events)
    }

    fn handle_counter(&self, cmd: &CounterOffer) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        let side = self.authorize(&cmd.actor, Requirement::EitherParty)?;
        let target = match side {
            Side::Buyer => QuoteStatus::SellerReview,
            _ => QuoteStatus::BuyerReview,
        };
        self.ensure_turn(side, target)?;

        if cmd.updates.is_empty() && cmd.shipping_cost.is_none() {
            return Err(DomainError::validation("a counter-offer must change something"));
        }
        let items = apply_updates(&self.items, &cmd.updates, side == Side::Seller)?;
        let revision = self
            .revision
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant("revision overflow"))?;

        Ok(vec![QuoteEvent::QuoteCounterOffered(QuoteCounterOffered {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            by: side,
            revision,
            items,
            shipping_cost: cmd.shipping_cost.unwrap_or(self.shipping_cost),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        let side = self.authorize(&cmd.actor, Requirement::EitherParty)?;
        self.ensure_turn(side, QuoteStatus::Accepted)?;

        Ok(vec![QuoteEvent::QuoteAccepted(QuoteAccepted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            accepted_by: side,
            revision: self.revision,
            items: self.items.clone(),
            shipping_cost: self.shipping_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        if !self.status.is_under_review() {
            return Err(DomainError::transition(
                self.status.as_str(),
                QuoteStatus::Rejected.as_str(),
            ));
        }
        let side = self.authorize(&cmd.actor, Requirement::EitherParty)?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a rejection reason is required"));
        }

        Ok(vec![QuoteEvent::QuoteRejected(QuoteRejected {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            rejection: Rejection {
                side,
                reason: reason.to_string(),
            },
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Time-driven. Expiring a closed quote is a no-op, not an error.
    fn handle_expire(&self, cmd: &ExpireQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.authorize(&cmd.actor, Requirement::SystemOnly)?;

        if self.status.is_terminal() {
            return Ok(vec![]);
        }
        if !self.is_expired_at(cmd.occurred_at) {
            return Err(DomainError::validation("quote has not reached its expiry time"));
        }

        Ok(vec![QuoteEvent::QuoteExpired(QuoteExpired {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            expired_from: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_order(&self, cmd: &LinkOrder) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.authorize(&cmd.actor, Requirement::PartyOrSystem)?;
        if self.status != QuoteStatus::Accepted {
            return Err(DomainError::invariant("only accepted quotes have an order"));
        }
        match self.order_id {
            Some(existing) if existing == cmd.order_id => Ok(vec![]),
            Some(_) => Err(DomainError::invariant("quote is already linked to another order")),
            None => Ok(vec![QuoteEvent::QuoteOrderLinked(QuoteOrderLinked {
                tenant_id: cmd.tenant_id,
                quote_id: cmd.quote_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}
