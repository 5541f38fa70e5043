#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use tradedesk_auth::Actor;
use tradedesk_core::{AddressId, Currency, SkuId, TenantId};
use tradedesk_events::{
    BusNotifier, EventBus, InMemoryEventBus, Notification, Notifier, NotifyError, Subscription,
};
use tradedesk_infra::EngineConfig;
use tradedesk_infra::directory::{InMemoryAssociationStore, InMemoryCatalog, Sku, TenantAssociation};
use tradedesk_infra::event_store::InMemoryEventStore;
use tradedesk_marketplace::{InMemoryMarketplaceRegistry, MarketplaceConfig};
use tradedesk_pricing::{Breakpoint, InMemoryPriceBook, PriceTier};
use tradedesk_workflow::{Collaborators, LineRequest, QuoteRequest, WorkflowEngine};

/// Notifier whose transport can be switched off.
pub struct Switchboard {
    down: AtomicBool,
    inner: BusNotifier<Arc<InMemoryEventBus<Notification>>>,
}

impl Switchboard {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl Notifier for Switchboard {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("transport down".into()));
        }
        self.inner.notify(notification)
    }
}

pub struct World {
    pub engine: WorkflowEngine,
    pub store: Arc<InMemoryEventStore>,
    pub registry: Arc<InMemoryMarketplaceRegistry>,
    pub config: MarketplaceConfig,
    pub prices: Arc<InMemoryPriceBook>,
    pub catalog: Arc<InMemoryCatalog>,
    pub associations: Arc<InMemoryAssociationStore>,
    pub notifier: Arc<Switchboard>,
    pub inbox: Subscription<Notification>,
    pub seller: TenantId,
    pub buyer: TenantId,
    pub dest: AddressId,
    pub usd: Currency,
}

impl World {
    pub fn new(config: MarketplaceConfig) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let registry = Arc::new(InMemoryMarketplaceRegistry::new());
        registry.publish(config.clone()).unwrap();
        let prices = Arc::new(InMemoryPriceBook::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let associations = Arc::new(InMemoryAssociationStore::new());
        let bus = Arc::new(InMemoryEventBus::<Notification>::new());
        let inbox = bus.subscribe();
        let notifier = Arc::new(Switchboard {
            down: AtomicBool::new(false),
            inner: BusNotifier::new(bus),
        });

        let world_collaborators = Collaborators {
            store: store.clone(),
            policies: registry.clone(),
            prices: prices.clone(),
            catalog: catalog.clone(),
            associations: associations.clone(),
            notifier: notifier.clone(),
        };
        let engine = WorkflowEngine::new(world_collaborators, &EngineConfig::default()).unwrap();

        let seller = TenantId::new();
        let buyer = TenantId::new();
        associations
            .insert(TenantAssociation::active(seller, buyer))
            .unwrap();

        Self {
            engine,
            store,
            registry,
            config,
            prices,
            catalog,
            associations,
            notifier,
            inbox,
            seller,
            buyer,
            dest: AddressId::new(),
            usd: Currency::new("USD").unwrap(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MarketplaceConfig::default())
    }

    /// A second engine over the same store and collaborators.
    pub fn restarted_engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(
            Collaborators {
                store: self.store.clone(),
                policies: self.registry.clone(),
                prices: self.prices.clone(),
                catalog: self.catalog.clone(),
                associations: self.associations.clone(),
                notifier: self.notifier.clone(),
            },
            &EngineConfig::default(),
        )
        .unwrap()
    }

    pub fn seller_actor(&self) -> Actor {
        Actor::seller(self.seller)
    }

    pub fn buyer_actor(&self) -> Actor {
        Actor::buyer(self.buyer)
    }

    pub fn request(&self) -> QuoteRequest {
        QuoteRequest {
            buyer_id: self.buyer,
            destination_id: self.dest,
            currency: self.usd,
            storefront_id: None,
        }
    }

    /// A catalog SKU with a seller-wide tier at `unit_price`.
    pub fn priced_sku(&self, unit_price: u64) -> SkuId {
        let sku = Sku::new(self.seller, "widget", unit_price, self.usd);
        let sku_id = sku.id;
        self.catalog.upsert(sku).unwrap();
        self.prices
            .upsert(PriceTier::seller_wide(self.seller, sku_id, self.usd, unit_price, Utc::now()))
            .unwrap();
        sku_id
    }

    /// A SKU with a buyer- and destination-scoped tier and breakpoints.
    pub fn tiered_sku(&self, base_price: u64, breakpoints: &[(u32, u64)]) -> (SkuId, PriceTier) {
        let sku = Sku::new(self.seller, "bulk widget", base_price, self.usd);
        let sku_id = sku.id;
        self.catalog.upsert(sku).unwrap();
        let tier = PriceTier::seller_wide(self.seller, sku_id, self.usd, base_price, Utc::now())
            .for_buyer(self.buyer)
            .for_destination(self.dest)
            .with_breakpoints(
                breakpoints
                    .iter()
                    .map(|&(min_quantity, unit_price)| Breakpoint {
                        min_quantity,
                        unit_price,
                    })
                    .collect(),
            );
        self.prices.upsert(tier.clone()).unwrap();
        (sku_id, tier)
    }

    pub fn line(&self, sku_id: SkuId, quantity: u32) -> LineRequest {
        LineRequest::new(sku_id, quantity)
    }

    pub fn topics_for(&self, recipient: TenantId) -> Vec<String> {
        self.inbox
            .drain()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .map(|n| n.topic)
            .collect()
    }
}

pub fn no_approval() -> MarketplaceConfig {
    MarketplaceConfig {
        require_quote_approval: false,
        ..MarketplaceConfig::default()
    }
}

pub fn direct_purchase() -> MarketplaceConfig {
    MarketplaceConfig {
        skip_quote_for_direct: true,
        enable_direct_purchase: true,
        ..MarketplaceConfig::default()
    }
}
