use std::convert::Infallible;
use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use tradedesk_events::{BusNotifier, InMemoryEventBus, Notification};
use tradedesk_infra::EngineConfig;
use tradedesk_infra::directory::{InMemoryAssociationStore, InMemoryCatalog};
use tradedesk_infra::event_store::InMemoryEventStore;
use tradedesk_infra::workers::SubscriberWorker;
use tradedesk_marketplace::{InMemoryMarketplaceRegistry, MarketplaceConfig};
use tradedesk_pricing::InMemoryPriceBook;
use tradedesk_workflow::{Collaborators, WorkflowEngine, spawn_expiry_sweeper, spawn_repair_job};

fn main() -> anyhow::Result<()> {
    tradedesk_observability::init();

    let config = EngineConfig::from_env();

    let registry = Arc::new(InMemoryMarketplaceRegistry::new());
    registry
        .publish(MarketplaceConfig::default())
        .context("failed to publish the default marketplace config")?;

    let notifications: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
    let engine = Arc::new(
        WorkflowEngine::new(
            Collaborators {
                store: Arc::new(InMemoryEventStore::new()),
                policies: registry,
                prices: Arc::new(InMemoryPriceBook::new()),
                catalog: Arc::new(InMemoryCatalog::new()),
                associations: Arc::new(InMemoryAssociationStore::new()),
                notifier: Arc::new(BusNotifier::new(notifications.clone())),
            },
            &config,
        )
        .context("failed to start the workflow engine")?,
    );

    let sweeper = spawn_expiry_sweeper(engine.clone(), config.sweep_interval)
        .context("failed to spawn the expiry sweeper")?;
    let repair = spawn_repair_job(engine.clone(), config.repair_interval)
        .context("failed to spawn the repair job")?;
    let notification_log = SubscriberWorker::spawn("notification-log", &notifications, None, |n: Notification| {
        info!(recipient = %n.recipient, topic = %n.topic, summary = %n.summary, "notification");
        Ok::<(), Infallible>(())
    })
    .context("failed to spawn the notification log")?;

    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        repair_interval_secs = config.repair_interval.as_secs(),
        quote_prefix = %config.quote_number_prefix,
        order_prefix = %config.order_number_prefix,
        "tradedesk engine running; close stdin to stop"
    );

    // Block until stdin closes, then stop workers in reverse start order.
    for line in std::io::stdin().lock().lines() {
        line.context("failed to read stdin")?;
    }

    notification_log.shutdown();
    repair.shutdown();
    sweeper.shutdown();
    info!("tradedesk engine stopped");
    Ok(())
}
