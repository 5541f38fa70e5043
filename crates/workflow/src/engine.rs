//! The negotiation workflow.
//!
//! Every operation resolves the owning seller of the document, runs one
//! command through the [`CommandDispatcher`] (load, decide, append with the
//! loaded version, publish), folds the committed envelopes into the boards
//! and then tells the counter-party. Steps that span documents
//! (lead → quote, quote → order) commit one document at a time; each later
//! step is keyed by an id derived from the earlier document, so a retry or
//! the repair job finishes the chain without duplicating anything.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use tradedesk_auth::{Actor, Requirement, ResourceOwners, authorize};
use tradedesk_core::{
    AddressId, Aggregate, AggregateId, Currency, DomainError, Money, SkuId, StorefrontId, TenantId,
};
use tradedesk_events::{
    EventBus, EventEnvelope, InMemoryEventBus, Notification, Notifier, Subscription,
};
use tradedesk_infra::directory::{AssociationStore, Catalog};
use tradedesk_infra::event_store::EventStore;
use tradedesk_infra::projections::{LeadBoard, OrderBoard, QuoteBoard};
use tradedesk_infra::{CommandDispatcher, Dispatched, EngineConfig, NumberSequence};
use tradedesk_leads::{
    ContactLead, ConvertLead, CreateLead, ForwardLead, ForwardTarget, Lead, LeadCommand, LeadId,
    LeadStatus, MarkLeadLost, QualifyLead, lead,
};
use tradedesk_marketplace::{Policy, PolicySource, resolve_policy};
use tradedesk_orders::{
    AttachShipmentAdvice, CancelOrder, ConfirmDelivery, ConfirmOrder, OrderId, OrderLine,
    OrderSource, PlaceOrder, PurchaseOrder, PurchaseOrderCommand, ShipOrder, order,
};
use tradedesk_pricing::{PriceBook, PriceTierResolver, PricingContext};
use tradedesk_quotes::{
    AcceptQuote, CounterOffer, CreateQuote, ExpireQuote, LinkOrder, Quote, QuoteCommand, QuoteId,
    QuoteItem, QuoteStatus, RejectQuote, SubmissionGates, SubmitQuote, quote, subtotal,
};

use crate::error::WorkflowResult;
use crate::outbox::{FlushReport, NotificationOutbox};
use crate::requests::{
    Cart, LeadAction, LineRequest, LinePrice, OrderAction, PriceSource, QuoteRequest, QuoteResponse,
};

pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

type EngineDispatcher = CommandDispatcher<Arc<dyn EventStore>, Arc<EnvelopeBus>>;

pub(crate) const ACCEPTANCE_PROCESS: &str = "quote-acceptance";
pub(crate) const EXPIRY_PROCESS: &str = "quote-expiry";

/// External collaborators the engine reads from or writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn EventStore>,
    pub policies: Arc<dyn PolicySource>,
    pub prices: Arc<dyn PriceBook>,
    pub catalog: Arc<dyn Catalog>,
    pub associations: Arc<dyn AssociationStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Entry point for leads, quotes, pricing and orders.
pub struct WorkflowEngine {
    dispatcher: EngineDispatcher,
    policies: Arc<dyn PolicySource>,
    resolver: PriceTierResolver<Arc<dyn PriceBook>>,
    catalog: Arc<dyn Catalog>,
    associations: Arc<dyn AssociationStore>,
    notifier: Arc<dyn Notifier>,
    outbox: NotificationOutbox,
    leads: LeadBoard,
    quotes: QuoteBoard,
    orders: OrderBoard,
    quote_numbers: NumberSequence,
    order_numbers: NumberSequence,
}

impl core::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("quote_numbers", &self.quote_numbers.prefix())
            .field("order_numbers", &self.order_numbers.prefix())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Wire the engine and fold any history already in the store into the
    /// boards.
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> WorkflowResult<Self> {
        let Collaborators {
            store,
            policies,
            prices,
            catalog,
            associations,
            notifier,
        } = collaborators;

        let engine = Self {
            dispatcher: CommandDispatcher::new(store, Arc::new(EnvelopeBus::new())),
            policies,
            resolver: PriceTierResolver::new(prices),
            catalog,
            associations,
            notifier,
            outbox: NotificationOutbox::default(),
            leads: LeadBoard::default(),
            quotes: QuoteBoard::default(),
            orders: OrderBoard::default(),
            quote_numbers: NumberSequence::new(config.quote_number_prefix.clone()),
            order_numbers: NumberSequence::new(config.order_number_prefix.clone()),
        };

        let store = engine.dispatcher.store();
        let leads = engine.leads.rebuild(store)?;
        let quotes = engine.quotes.rebuild(store)?;
        let orders = engine.orders.rebuild(store)?;
        info!(leads, quotes, orders, "boards rebuilt from stored history");
        Ok(engine)
    }

    /// Committed envelopes of every transition, in commit order per stream.
    pub fn subscribe_events(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    pub fn leads(&self) -> &LeadBoard {
        &self.leads
    }

    pub fn quotes(&self) -> &QuoteBoard {
        &self.quotes
    }

    pub fn orders(&self) -> &OrderBoard {
        &self.orders
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    /// Effective marketplace policy for a seller.
    pub fn policy(&self, seller_id: TenantId) -> WorkflowResult<Policy> {
        Ok(resolve_policy(self.policies.as_ref(), seller_id)?)
    }

    // ---- leads -----------------------------------------------------------

    pub fn create_lead(
        &self,
        seller_id: TenantId,
        buyer_email: impl Into<String>,
        details: impl Into<String>,
    ) -> WorkflowResult<LeadId> {
        let lead_id = LeadId::new(AggregateId::new());
        let created = self.dispatch_lead(
            seller_id,
            lead_id,
            LeadCommand::CreateLead(CreateLead {
                tenant_id: seller_id,
                lead_id,
                buyer_email: buyer_email.into(),
                details: details.into(),
                parent_id: None,
                occurred_at: Utc::now(),
            }),
        )?;
        self.notify(
            seller_id,
            "leads.lead.created",
            lead_id.0,
            format!("new lead from {}", created.aggregate.buyer_email()),
        );
        Ok(lead_id)
    }

    pub fn lead(&self, lead_id: LeadId) -> WorkflowResult<Lead> {
        let seller = self.lead_owner(lead_id)?;
        self.load_lead(seller, lead_id)
    }

    pub fn transition_lead(&self, lead_id: LeadId, action: LeadAction, actor: &Actor) -> WorkflowResult<Lead> {
        let seller = self.lead_owner(lead_id)?;
        let now = Utc::now();
        let command = match action {
            LeadAction::Contact => LeadCommand::ContactLead(ContactLead {
                tenant_id: seller,
                lead_id,
                actor: actor.clone(),
                occurred_at: now,
            }),
            LeadAction::Qualify => LeadCommand::QualifyLead(QualifyLead {
                tenant_id: seller,
                lead_id,
                actor: actor.clone(),
                occurred_at: now,
            }),
            LeadAction::MarkLost { reason_code } => LeadCommand::MarkLeadLost(MarkLeadLost {
                tenant_id: seller,
                lead_id,
                reason_code,
                actor: actor.clone(),
                occurred_at: now,
            }),
        };
        Ok(self.dispatch_lead(seller, lead_id, command)?.aggregate)
    }

    /// Fan a lead out to other sellers: one child lead per candidate.
    pub fn forward_lead(
        &self,
        lead_id: LeadId,
        candidate_sellers: &[TenantId],
        actor: &Actor,
    ) -> WorkflowResult<Vec<LeadId>> {
        let seller = self.lead_owner(lead_id)?;
        let targets: Vec<ForwardTarget> = candidate_sellers
            .iter()
            .map(|&seller_id| ForwardTarget {
                lead_id: LeadId::new(AggregateId::new()),
                seller_id,
            })
            .collect();

        let forwarded = self.dispatch_lead(
            seller,
            lead_id,
            LeadCommand::ForwardLead(ForwardLead {
                tenant_id: seller,
                lead_id,
                targets: targets.clone(),
                actor: actor.clone(),
                occurred_at: Utc::now(),
            }),
        )?;

        for target in &targets {
            if let Err(err) = self.create_child_lead(&forwarded.aggregate, target) {
                error!(
                    parent = %lead_id,
                    child = %target.lead_id,
                    seller_id = %target.seller_id,
                    error = %err,
                    "child lead not created; repair will retry"
                );
            }
        }
        Ok(targets.into_iter().map(|t| t.lead_id).collect())
    }

    pub(crate) fn create_child_lead(&self, parent: &Lead, target: &ForwardTarget) -> WorkflowResult<()> {
        self.dispatch_lead(
            target.seller_id,
            target.lead_id,
            LeadCommand::CreateLead(CreateLead {
                tenant_id: target.seller_id,
                lead_id: target.lead_id,
                buyer_email: parent.buyer_email().to_string(),
                details: parent.details().to_string(),
                parent_id: Some(parent.id_typed()),
                occurred_at: Utc::now(),
            }),
        )?;
        self.notify(
            target.seller_id,
            "leads.lead.forwarded",
            target.lead_id.0,
            format!("lead forwarded from {}", parent.buyer_email()),
        );
        Ok(())
    }

    /// Convert a qualified lead and open its draft quote.
    ///
    /// Safe to retry: the quote id is derived from the lead and the quote
    /// terms are recorded on the lead, so a lead already converted to that
    /// quote only gets the missing quote created (from the recorded terms).
    pub fn convert_lead_to_quote(
        &self,
        lead_id: LeadId,
        request: QuoteRequest,
        actor: &Actor,
    ) -> WorkflowResult<QuoteId> {
        let seller = self.lead_owner(lead_id)?;
        let quote_id = QuoteId::for_lead(lead_id);
        let lead = self.load_lead(seller, lead_id)?;
        if lead.status() == LeadStatus::Converted && lead.quote_id() == Some(quote_id.0) {
            if !self.load_quote(seller, quote_id)?.is_created() {
                self.open_converted_quote(seller, &lead, actor)?;
            }
            return Ok(quote_id);
        }

        let policy = self.policy(seller)?;
        self.ensure_association(seller, request.buyer_id, request.storefront_id, &policy)?;
        let now = Utc::now();
        let draft = self.create_quote_command(
            seller,
            quote_id,
            &request,
            Some(lead_id),
            &policy,
            actor.clone(),
            now,
        )?;
        // Nothing is written unless both documents accept the change.
        Quote::empty(quote_id).handle(&draft)?;

        let converted = self.dispatch_lead(
            seller,
            lead_id,
            LeadCommand::ConvertLead(ConvertLead {
                tenant_id: seller,
                lead_id,
                quote_id: quote_id.0,
                terms: request.terms(),
                actor: actor.clone(),
                occurred_at: now,
            }),
        )?;
        self.open_converted_quote(seller, &converted.aggregate, actor)?;
        Ok(quote_id)
    }

    /// Create the draft quote of a converted lead from the terms recorded
    /// on the lead.
    pub(crate) fn open_converted_quote(&self, seller: TenantId, lead: &Lead, actor: &Actor) -> WorkflowResult<Quote> {
        let terms = lead
            .conversion_terms()
            .ok_or_else(|| DomainError::invariant("converted lead has no quote terms"))?;
        let lead_id = lead.id_typed();
        let quote_id = QuoteId::for_lead(lead_id);
        let policy = self.policy(seller)?;
        let command = self.create_quote_command(
            seller,
            quote_id,
            &QuoteRequest::from(terms),
            Some(lead_id),
            &policy,
            actor.clone(),
            Utc::now(),
        )?;
        let created = self.dispatch_quote(seller, quote_id, command)?;
        self.notify_parties(seller, &created.aggregate, actor, "quotes.quote.created", "quote opened");
        Ok(created.aggregate)
    }

    // ---- quotes ----------------------------------------------------------

    /// Open a draft quote. Expiry is `now + quoteTtlHours` of the seller.
    pub fn create_quote(&self, seller_id: TenantId, request: QuoteRequest, actor: &Actor) -> WorkflowResult<QuoteId> {
        let policy = self.policy(seller_id)?;
        self.ensure_association(seller_id, request.buyer_id, request.storefront_id, &policy)?;
        let quote_id = QuoteId::new(AggregateId::new());
        let command = self.create_quote_command(
            seller_id,
            quote_id,
            &request,
            None,
            &policy,
            actor.clone(),
            Utc::now(),
        )?;
        let created = self.dispatch_quote(seller_id, quote_id, command)?;
        self.notify_parties(seller_id, &created.aggregate, actor, "quotes.quote.created", "quote opened");
        Ok(quote_id)
    }

    pub fn quote(&self, quote_id: QuoteId) -> WorkflowResult<Quote> {
        let seller = self.quote_owner(quote_id)?;
        self.load_quote(seller, quote_id)
    }

    /// Price the requested lines and submit the draft.
    ///
    /// Depending on policy the quote lands in seller review, or is accepted
    /// outright; an accepted quote gets its order before this returns.
    pub fn submit_quote(
        &self,
        quote_id: QuoteId,
        lines: &[LineRequest],
        shipping_cost: u64,
        actor: &Actor,
    ) -> WorkflowResult<Quote> {
        let seller = self.quote_owner(quote_id)?;
        let current = self.load_quote(seller, quote_id)?;
        let now = Utc::now();
        self.expire_if_overdue(seller, &current, QuoteStatus::Submitted, now)?;
        if current.status() != QuoteStatus::Draft {
            return Err(DomainError::transition(
                current.status().as_str(),
                QuoteStatus::Submitted.as_str(),
            )
            .into());
        }

        let (buyer, destination, currency) = quote_terms(&current)?;
        let policy = self.policy(seller)?;
        let items = self.price_lines(
            seller,
            buyer,
            destination,
            currency,
            lines,
            policy.enable_volume_discounts,
        )?;
        let gates = SubmissionGates {
            association_active: self
                .associations
                .get_active_association(seller, buyer, current.storefront_id())
                .is_some(),
            allow_associationless: policy.allow_associationless_requests,
            require_approval: policy.require_quote_approval,
            auto_approve: policy.auto_approve_quotes,
            min_order_value: policy.min_order_value,
        };

        let submitted = self.dispatch_quote(
            seller,
            quote_id,
            QuoteCommand::SubmitQuote(SubmitQuote {
                tenant_id: seller,
                quote_id,
                items,
                shipping_cost,
                gates,
                actor: actor.clone(),
                occurred_at: now,
            }),
        )?;
        let quote = submitted.aggregate;
        self.notify_parties(seller, &quote, actor, "quotes.quote.submitted", "quote submitted");

        if quote.status() == QuoteStatus::Accepted {
            self.notify_parties(seller, &quote, actor, "quotes.quote.accepted", "quote accepted");
            return Ok(self.settle_acceptance(seller, quote));
        }
        Ok(quote)
    }

    /// Counter, accept or reject on behalf of the side whose turn it is.
    pub fn respond_to_quote(
        &self,
        quote_id: QuoteId,
        response: QuoteResponse,
        actor: &Actor,
    ) -> WorkflowResult<Quote> {
        let seller = self.quote_owner(quote_id)?;
        let current = self.load_quote(seller, quote_id)?;
        let now = Utc::now();
        self.expire_if_overdue(seller, &current, requested_status(&response, current.status()), now)?;

        let (command, topic, summary) = match response {
            QuoteResponse::Counter {
                updates,
                shipping_cost,
            } => (
                QuoteCommand::CounterOffer(CounterOffer {
                    tenant_id: seller,
                    quote_id,
                    updates,
                    shipping_cost,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "quotes.quote.counter_offered",
                "counter-offer received".to_string(),
            ),
            QuoteResponse::Accept => (
                QuoteCommand::AcceptQuote(AcceptQuote {
                    tenant_id: seller,
                    quote_id,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "quotes.quote.accepted",
                "quote accepted".to_string(),
            ),
            QuoteResponse::Reject { reason } => (
                QuoteCommand::RejectQuote(RejectQuote {
                    tenant_id: seller,
                    quote_id,
                    reason: reason.clone(),
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "quotes.quote.rejected",
                format!("quote rejected: {reason}"),
            ),
        };

        let quote = self.dispatch_quote(seller, quote_id, command)?.aggregate;
        self.notify_parties(seller, &quote, actor, topic, &summary);
        if quote.status() == QuoteStatus::Accepted {
            return Ok(self.settle_acceptance(seller, quote));
        }
        Ok(quote)
    }

    /// Expire one quote. Already terminal quotes come back unchanged.
    pub fn expire_quote(&self, quote_id: QuoteId) -> WorkflowResult<Quote> {
        let seller = self.quote_owner(quote_id)?;
        Ok(self.expire_at(seller, quote_id, Utc::now())?.aggregate)
    }

    pub(crate) fn expire_at(
        &self,
        seller: TenantId,
        quote_id: QuoteId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Dispatched<Quote>> {
        let actor = Actor::system(EXPIRY_PROCESS);
        let expired = self.dispatch_quote(
            seller,
            quote_id,
            QuoteCommand::ExpireQuote(ExpireQuote {
                tenant_id: seller,
                quote_id,
                actor: actor.clone(),
                occurred_at: now,
            }),
        )?;
        if !expired.is_noop() {
            self.notify_parties(seller, &expired.aggregate, &actor, "quotes.quote.expired", "quote expired");
        }
        Ok(expired)
    }

    /// A quote found overdue on access expires first; the requested
    /// transition is then refused against the expired state.
    fn expire_if_overdue(
        &self,
        seller: TenantId,
        current: &Quote,
        requested: QuoteStatus,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        if !current.is_expired_at(now) {
            return Ok(());
        }
        self.expire_at(seller, current.id_typed(), now)?;
        Err(DomainError::transition(QuoteStatus::Expired.as_str(), requested.as_str()).into())
    }

    /// Create (or find) the order of an accepted quote and link it.
    ///
    /// Failures are logged and left to the repair job; the acceptance itself
    /// is already committed.
    fn settle_acceptance(&self, seller: TenantId, quote: Quote) -> Quote {
        match self.ensure_order_for_quote(seller, &quote) {
            Ok((_, linked)) => linked,
            Err(err) => {
                error!(
                    quote_id = %quote.id_typed(),
                    seller_id = %seller,
                    error = %err,
                    "accepted quote has no order yet; repair will retry"
                );
                quote
            }
        }
    }

    pub(crate) fn ensure_order_for_quote(
        &self,
        seller: TenantId,
        quote: &Quote,
    ) -> WorkflowResult<(PurchaseOrder, Quote)> {
        let quote_id = quote.id_typed();
        if quote.status() != QuoteStatus::Accepted {
            return Err(DomainError::invariant("only accepted quotes have an order").into());
        }
        let order_id = OrderId::for_quote(quote_id);
        let existing = self.load_order(seller, order_id)?;

        let order = if existing.is_created() {
            debug!(%quote_id, %order_id, "order already placed for quote");
            existing
        } else {
            let (buyer, destination, currency) = quote_terms(quote)?;
            let policy = self.policy(seller)?;
            let actor = Actor::system(ACCEPTANCE_PROCESS);
            let placed = self.dispatch_order(
                seller,
                order_id,
                PurchaseOrderCommand::PlaceOrder(PlaceOrder {
                    tenant_id: seller,
                    order_id,
                    number: self.order_numbers.next_number(),
                    buyer_id: buyer,
                    source: OrderSource::Quote(quote_id),
                    lines: quote.items().iter().map(OrderLine::from).collect(),
                    shipping_cost: quote.shipping_cost(),
                    currency,
                    destination_id: destination,
                    auto_accept: policy.auto_accept_orders,
                    actor: actor.clone(),
                    occurred_at: Utc::now(),
                }),
            )?;
            self.notify_order_parties(&placed.aggregate, &actor, "orders.order.placed", "order placed from quote");
            placed.aggregate
        };

        let linked = self.dispatch_quote(
            seller,
            quote_id,
            QuoteCommand::LinkOrder(LinkOrder {
                tenant_id: seller,
                quote_id,
                order_id: order_id.0,
                actor: Actor::system(ACCEPTANCE_PROCESS),
                occurred_at: Utc::now(),
            }),
        )?;
        Ok((order, linked.aggregate))
    }

    // ---- pricing ---------------------------------------------------------

    /// Unit price for one SKU and quantity between a seller and a buyer.
    pub fn resolve_price(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        destination_id: AddressId,
        sku_id: SkuId,
        currency: Currency,
        quantity: u32,
    ) -> WorkflowResult<LinePrice> {
        let policy = self.policy(seller_id)?;
        let ctx = PricingContext {
            seller_id,
            buyer_id,
            destination_id,
            sku_id,
            currency,
            quantity,
        };
        Ok(self.price_line(&ctx, policy.enable_volume_discounts)?)
    }

    fn price_line(&self, ctx: &PricingContext, volume_discounts: bool) -> Result<LinePrice, DomainError> {
        let sku = self
            .catalog
            .get_sku(ctx.sku_id)
            .ok_or_else(|| DomainError::validation(format!("unknown sku {}", ctx.sku_id)))?;
        if sku.seller_id != ctx.seller_id {
            return Err(DomainError::validation(format!(
                "sku {} is not sold by this seller",
                ctx.sku_id
            )));
        }
        if !sku.active {
            return Err(DomainError::validation(format!("sku {} is not active", ctx.sku_id)));
        }

        match self.resolver.resolve(ctx, volume_discounts) {
            Ok(resolved) => Ok(LinePrice {
                unit_price: resolved.unit_price,
                source: PriceSource::Tier {
                    tier_id: resolved.tier_id,
                    breakpoint: resolved.breakpoint,
                },
            }),
            Err(DomainError::NoPricingAvailable(reason))
                if sku.list_price_fallback && sku.currency == ctx.currency =>
            {
                debug!(sku_id = %ctx.sku_id, %reason, "no tier; using list price");
                Ok(LinePrice {
                    unit_price: Money::new(sku.base_price, sku.currency),
                    source: PriceSource::ListPrice,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn price_lines(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        destination_id: AddressId,
        currency: Currency,
        lines: &[LineRequest],
        volume_discounts: bool,
    ) -> Result<Vec<QuoteItem>, DomainError> {
        lines
            .iter()
            .zip(1u32..)
            .map(|(line, line_no)| {
                let ctx = PricingContext {
                    seller_id,
                    buyer_id,
                    destination_id,
                    sku_id: line.sku_id,
                    currency,
                    quantity: line.quantity,
                };
                let price = self.price_line(&ctx, volume_discounts)?;
                Ok(QuoteItem {
                    line_no,
                    sku_id: line.sku_id,
                    quantity: line.quantity,
                    unit_price: price.unit_price.amount,
                    tier_id: price.tier_id(),
                    seller_notes: None,
                })
            })
            .collect()
    }

    // ---- orders ----------------------------------------------------------

    pub fn order(&self, order_id: OrderId) -> WorkflowResult<PurchaseOrder> {
        let seller = self.order_owner(order_id)?;
        self.load_order(seller, order_id)
    }

    /// The order placed for a quote, if any.
    pub fn order_for_quote(&self, quote_id: QuoteId) -> Option<PurchaseOrder> {
        self.orders.for_quote(quote_id).map(|(_, order)| order)
    }

    pub fn advance_order(&self, order_id: OrderId, action: OrderAction, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        let seller = self.order_owner(order_id)?;
        let now = Utc::now();
        let (command, topic) = match action {
            OrderAction::Confirm => (
                PurchaseOrderCommand::ConfirmOrder(ConfirmOrder {
                    tenant_id: seller,
                    order_id,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "orders.order.confirmed",
            ),
            OrderAction::AttachShipmentAdvice { advice } => (
                PurchaseOrderCommand::AttachShipmentAdvice(AttachShipmentAdvice {
                    tenant_id: seller,
                    order_id,
                    advice,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "orders.order.shipment_advice_attached",
            ),
            OrderAction::Ship { advice } => (
                PurchaseOrderCommand::ShipOrder(ShipOrder {
                    tenant_id: seller,
                    order_id,
                    advice,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "orders.order.shipped",
            ),
            OrderAction::ConfirmDelivery => (
                PurchaseOrderCommand::ConfirmDelivery(ConfirmDelivery {
                    tenant_id: seller,
                    order_id,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "orders.order.delivered",
            ),
            OrderAction::Cancel { reason } => (
                PurchaseOrderCommand::CancelOrder(CancelOrder {
                    tenant_id: seller,
                    order_id,
                    reason,
                    actor: actor.clone(),
                    occurred_at: now,
                }),
                "orders.order.cancelled",
            ),
        };

        let order = self.dispatch_order(seller, order_id, command)?.aggregate;
        self.notify_order_parties(&order, actor, topic, order.status().as_str());
        Ok(order)
    }

    /// Place an order straight from a cart, bypassing negotiation.
    pub fn direct_checkout(&self, cart: Cart, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        let seller = cart.seller_id;
        authorize(
            actor,
            &ResourceOwners::new(seller, Some(cart.buyer_id)),
            Requirement::BuyerOnly,
        )
        .map_err(DomainError::from)?;
        let policy = self.policy(seller)?;
        if !policy.allows_direct_checkout() {
            return Err(DomainError::policy("direct purchase is not enabled for this seller").into());
        }
        if cart.lines.is_empty() {
            return Err(DomainError::validation("the cart is empty").into());
        }
        let max_items = usize::try_from(policy.max_cart_items).unwrap_or(usize::MAX);
        if cart.lines.len() > max_items {
            return Err(DomainError::policy(format!(
                "cart has {} items; the limit is {}",
                cart.lines.len(),
                policy.max_cart_items
            ))
            .into());
        }
        self.ensure_association(seller, cart.buyer_id, cart.storefront_id, &policy)?;

        let items = self.price_lines(
            seller,
            cart.buyer_id,
            cart.destination_id,
            cart.currency,
            &cart.lines,
            policy.enable_volume_discounts,
        )?;
        let value = subtotal(&items)?;
        if value < policy.min_order_value {
            return Err(DomainError::policy(format!(
                "order value {value} is below the minimum of {}",
                policy.min_order_value
            ))
            .into());
        }

        let order_id = OrderId::new(AggregateId::new());
        let placed = self.dispatch_order(
            seller,
            order_id,
            PurchaseOrderCommand::PlaceOrder(PlaceOrder {
                tenant_id: seller,
                order_id,
                number: self.order_numbers.next_number(),
                buyer_id: cart.buyer_id,
                source: OrderSource::Direct,
                lines: items.iter().map(OrderLine::from).collect(),
                shipping_cost: cart.shipping_cost,
                currency: cart.currency,
                destination_id: cart.destination_id,
                auto_accept: policy.auto_accept_orders,
                actor: actor.clone(),
                occurred_at: Utc::now(),
            }),
        )?;
        self.notify_order_parties(&placed.aggregate, actor, "orders.order.placed", "order placed");
        Ok(placed.aggregate)
    }

    // ---- notifications ---------------------------------------------------

    /// Retry parked notifications.
    pub fn flush_notifications(&self) -> FlushReport {
        self.outbox.flush(self.notifier.as_ref())
    }

    fn notify(&self, recipient: TenantId, topic: &str, subject_id: AggregateId, summary: impl Into<String>) {
        let notification = Notification::new(recipient, topic, subject_id, summary, Utc::now());
        self.outbox.deliver(self.notifier.as_ref(), notification);
    }

    pub(crate) fn notify_parties(&self, seller: TenantId, quote: &Quote, actor: &Actor, topic: &str, summary: &str) {
        let summary = format!("{} {summary}", quote.number());
        for recipient in counterparties(actor, seller, quote.buyer_id()) {
            self.notify(recipient, topic, quote.id_typed().0, summary.clone());
        }
    }

    fn notify_order_parties(&self, order: &PurchaseOrder, actor: &Actor, topic: &str, summary: &str) {
        let Some(seller) = order.seller_id() else {
            return;
        };
        let summary = format!("{} {summary}", order.number());
        for recipient in counterparties(actor, seller, order.buyer_id()) {
            self.notify(recipient, topic, order.id_typed().0, summary.clone());
        }
    }

    // ---- plumbing --------------------------------------------------------

    fn ensure_association(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        storefront_id: Option<StorefrontId>,
        policy: &Policy,
    ) -> Result<(), DomainError> {
        let associated = self
            .associations
            .get_active_association(seller_id, buyer_id, storefront_id)
            .is_some();
        if associated || policy.allow_associationless_requests {
            return Ok(());
        }
        Err(DomainError::association_required(seller_id, buyer_id))
    }

    #[allow(clippy::too_many_arguments)]
    fn create_quote_command(
        &self,
        seller_id: TenantId,
        quote_id: QuoteId,
        request: &QuoteRequest,
        lead_id: Option<LeadId>,
        policy: &Policy,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<QuoteCommand> {
        let expires_at = now
            .checked_add_signed(Duration::hours(i64::from(policy.quote_ttl_hours)))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "quote lifetime of {} hours is out of range",
                    policy.quote_ttl_hours
                ))
            })?;
        Ok(QuoteCommand::CreateQuote(CreateQuote {
            tenant_id: seller_id,
            quote_id,
            number: self.quote_numbers.next_number(),
            buyer_id: request.buyer_id,
            storefront_id: request.storefront_id,
            destination_id: request.destination_id,
            currency: request.currency,
            lead_id,
            expires_at,
            actor,
            occurred_at: now,
        }))
    }

    fn lead_owner(&self, lead_id: LeadId) -> WorkflowResult<TenantId> {
        self.leads
            .owner_of(lead_id.0)
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn quote_owner(&self, quote_id: QuoteId) -> WorkflowResult<TenantId> {
        self.quotes
            .owner_of(quote_id.0)
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn order_owner(&self, order_id: OrderId) -> WorkflowResult<TenantId> {
        self.orders
            .owner_of(order_id.0)
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn load_lead(&self, seller: TenantId, lead_id: LeadId) -> WorkflowResult<Lead> {
        Ok(self
            .dispatcher
            .load(seller, lead_id.0, |_, id| Lead::empty(LeadId::new(id)))?)
    }

    fn load_quote(&self, seller: TenantId, quote_id: QuoteId) -> WorkflowResult<Quote> {
        Ok(self
            .dispatcher
            .load(seller, quote_id.0, |_, id| Quote::empty(QuoteId::new(id)))?)
    }

    fn load_order(&self, seller: TenantId, order_id: OrderId) -> WorkflowResult<PurchaseOrder> {
        Ok(self
            .dispatcher
            .load(seller, order_id.0, |_, id| PurchaseOrder::empty(OrderId::new(id)))?)
    }

    fn dispatch_lead(&self, seller: TenantId, lead_id: LeadId, command: LeadCommand) -> WorkflowResult<Dispatched<Lead>> {
        let dispatched = self.dispatcher.dispatch(
            seller,
            lead_id.0,
            lead::AGGREGATE_TYPE,
            command,
            |_, id| Lead::empty(LeadId::new(id)),
        )?;
        self.project(&dispatched);
        Ok(dispatched)
    }

    pub(crate) fn dispatch_quote(
        &self,
        seller: TenantId,
        quote_id: QuoteId,
        command: QuoteCommand,
    ) -> WorkflowResult<Dispatched<Quote>> {
        let dispatched = self.dispatcher.dispatch(
            seller,
            quote_id.0,
            quote::AGGREGATE_TYPE,
            command,
            |_, id| Quote::empty(QuoteId::new(id)),
        )?;
        self.project(&dispatched);
        Ok(dispatched)
    }

    fn dispatch_order(
        &self,
        seller: TenantId,
        order_id: OrderId,
        command: PurchaseOrderCommand,
    ) -> WorkflowResult<Dispatched<PurchaseOrder>> {
        let dispatched = self.dispatcher.dispatch(
            seller,
            order_id.0,
            order::AGGREGATE_TYPE,
            command,
            |_, id| PurchaseOrder::empty(OrderId::new(id)),
        )?;
        self.project(&dispatched);
        Ok(dispatched)
    }

    /// Fold committed envelopes into the boards and retry parked
    /// notifications. A board that missed earlier events of a stream reloads
    /// that stream from the store; failures here never fail the committed
    /// transition.
    fn project<A>(&self, dispatched: &Dispatched<A>) {
        if dispatched.is_noop() {
            return;
        }
        let store = self.dispatcher.store();
        for envelope in dispatched.envelopes() {
            let folded = self
                .leads
                .apply_or_catch_up(&envelope, store)
                .and_then(|()| self.quotes.apply_or_catch_up(&envelope, store))
                .and_then(|()| self.orders.apply_or_catch_up(&envelope, store));
            if let Err(err) = folded {
                warn!(
                    event_id = %envelope.event_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    error = %err,
                    "board projection failed"
                );
            }
        }
        let flushed = self.flush_notifications();
        if flushed.delivered > 0 {
            info!(delivered = flushed.delivered, "parked notifications delivered");
        }
    }

    /// Re-fold every stream into the boards.
    pub fn rebuild_boards(&self) -> WorkflowResult<usize> {
        let store = self.dispatcher.store();
        Ok(self.leads.rebuild(store)? + self.quotes.rebuild(store)? + self.orders.rebuild(store)?)
    }
}

fn quote_terms(quote: &Quote) -> Result<(TenantId, AddressId, Currency), DomainError> {
    match (quote.buyer_id(), quote.destination_id(), quote.currency()) {
        (Some(buyer), Some(destination), Some(currency)) => Ok((buyer, destination, currency)),
        _ => Err(DomainError::not_found()),
    }
}

fn requested_status(response: &QuoteResponse, current: QuoteStatus) -> QuoteStatus {
    match response {
        QuoteResponse::Accept => QuoteStatus::Accepted,
        QuoteResponse::Reject { .. } => QuoteStatus::Rejected,
        QuoteResponse::Counter { .. } if current == QuoteStatus::SellerReview => QuoteStatus::BuyerReview,
        QuoteResponse::Counter { .. } => QuoteStatus::SellerReview,
    }
}

/// The parties to tell about a transition made by `actor`: the other side,
/// or both sides when the system acted.
fn counterparties(actor: &Actor, seller: TenantId, buyer: Option<TenantId>) -> Vec<TenantId> {
    let parties = std::iter::once(seller).chain(buyer);
    match actor.tenant_id() {
        Some(acting) => parties.filter(|p| *p != acting).collect(),
        None => parties.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterparties_exclude_the_acting_side() {
        let seller = TenantId::new();
        let buyer = TenantId::new();

        assert_eq!(counterparties(&Actor::seller(seller), seller, Some(buyer)), vec![buyer]);
        assert_eq!(counterparties(&Actor::buyer(buyer), seller, Some(buyer)), vec![seller]);
        assert_eq!(
            counterparties(&Actor::system("sweeper"), seller, Some(buyer)),
            vec![seller, buyer]
        );
    }

    #[test]
    fn counter_offers_request_the_other_review_state() {
        let counter = QuoteResponse::Counter {
            updates: vec![],
            shipping_cost: None,
        };
        assert_eq!(
            requested_status(&counter, QuoteStatus::SellerReview),
            QuoteStatus::BuyerReview
        );
        assert_eq!(
            requested_status(&counter, QuoteStatus::BuyerReview),
            QuoteStatus::SellerReview
        );
        assert_eq!(
            requested_status(&QuoteResponse::Accept, QuoteStatus::BuyerReview),
            QuoteStatus::Accepted
        );
    }
}
