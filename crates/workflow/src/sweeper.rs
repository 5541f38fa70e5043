//! Quote expiry sweep.
//!
//! Expiry is eventual: only quotes still open at sweep time expire, and a
//! quote accepted between the scan and the write wins (the expire command
//! becomes a no-op against the accepted state, or loses the optimistic lock
//! and is retried next sweep).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use tradedesk_infra::workers::{PeriodicWorker, WorkerHandle};

use crate::engine::WorkflowEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    /// Found overdue but already closed by the time of the write.
    pub unchanged: usize,
    pub failed: usize,
}

impl WorkflowEngine {
    /// Expire every open quote whose expiry is at or before `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for (seller, quote) in self.quotes().overdue(now) {
            let quote_id = quote.id_typed();
            match self.expire_at(seller, quote_id, now) {
                Ok(expired) if expired.is_noop() => report.unchanged += 1,
                Ok(_) => report.expired += 1,
                Err(err) => {
                    warn!(
                        %quote_id,
                        seller_id = %seller,
                        retryable = err.is_retryable(),
                        error = %err,
                        "quote expiry failed; retrying next sweep"
                    );
                    report.failed += 1;
                }
            }
        }

        let flushed = self.flush_notifications();
        if report.expired > 0 || report.failed > 0 {
            info!(
                expired = report.expired,
                unchanged = report.unchanged,
                failed = report.failed,
                notifications_delivered = flushed.delivered,
                "expiry sweep finished"
            );
        }
        report
    }
}

/// Run [`WorkflowEngine::sweep_expired`] every `interval` on its own thread.
pub fn spawn_expiry_sweeper(engine: Arc<WorkflowEngine>, interval: Duration) -> io::Result<WorkerHandle> {
    PeriodicWorker::spawn("quote-expiry-sweeper", interval, move || {
        let report = engine.sweep_expired(Utc::now());
        if report.failed > 0 { Err(report) } else { Ok(()) }
    })
}
