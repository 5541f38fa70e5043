use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::warn;

use tradedesk_core::TenantId;
use tradedesk_events::{EventBus, Subscription, TenantScoped};

use super::{WorkerHandle, WorkerStats, record};

/// Consumes a bus subscription on its own thread.
///
/// Handlers must be idempotent (delivery is at-least-once). With a tenant
/// filter, messages for other tenants are dropped before the handler.
#[derive(Debug)]
pub struct SubscriberWorker;

impl SubscriberWorker {
    pub fn spawn<M, B, H, E>(
        name: &str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let worker_stats = stats.clone();
        let worker_name = name.to_string();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            let tick = Duration::from_millis(250);
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                match sub.recv_timeout(tick) {
                    Ok(msg) => {
                        if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                            continue;
                        }
                        let result = handler(msg);
                        if let Err(err) = &result {
                            warn!(worker = %worker_name, error = ?err, "subscriber handler failed");
                        }
                        record(&worker_stats, result.is_ok());
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        Ok(WorkerHandle {
            name: name.to_string(),
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}
