//! Reconciliation of multi-document steps that stopped halfway.
//!
//! Three gaps are recoverable: a converted lead whose quote was never
//! opened, an accepted quote whose order was never placed or linked, and a
//! forwarded lead whose child leads were not all created. Each is keyed by
//! ids fixed in the first committed document, so running the repair any
//! number of times converges on the same state.
//!
//! A pass starts by re-folding the store into the boards, so documents
//! written by another process sharing the store are seen too.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use tradedesk_auth::Actor;
use tradedesk_infra::workers::{PeriodicWorker, WorkerHandle};
use tradedesk_quotes::QuoteId;

use crate::engine::WorkflowEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub quotes_opened: usize,
    pub orders_linked: usize,
    pub child_leads_created: usize,
    pub failed: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.quotes_opened == 0
            && self.orders_linked == 0
            && self.child_leads_created == 0
            && self.failed == 0
    }
}

impl WorkflowEngine {
    pub fn repair(&self) -> RepairReport {
        let mut report = RepairReport::default();
        if let Err(err) = self.rebuild_boards() {
            warn!(error = %err, "board rebuild before repair failed");
        }

        for (seller, lead) in self.leads().converted() {
            let quote_id = QuoteId::for_lead(lead.id_typed());
            if lead.quote_id() != Some(quote_id.0) || self.quotes().owner_of(quote_id.0).is_some() {
                continue;
            }
            // Conversion is seller-only, so the quote is opened on the seller's behalf.
            match self.open_converted_quote(seller, &lead, &Actor::seller(seller)) {
                Ok(_) => report.quotes_opened += 1,
                Err(err) => {
                    warn!(lead_id = %lead.id_typed(), %quote_id, error = %err, "quote repair failed");
                    report.failed += 1;
                }
            }
        }

        for (seller, quote) in self.quotes().accepted_without_order() {
            match self.ensure_order_for_quote(seller, &quote) {
                Ok(_) => report.orders_linked += 1,
                Err(err) => {
                    warn!(quote_id = %quote.id_typed(), error = %err, "order repair failed");
                    report.failed += 1;
                }
            }
        }

        for (_, parent) in self.leads().forwarded() {
            for target in parent.children() {
                if self.leads().owner_of(target.lead_id.0).is_some() {
                    continue;
                }
                match self.create_child_lead(&parent, target) {
                    Ok(()) => report.child_leads_created += 1,
                    Err(err) => {
                        warn!(
                            parent = %parent.id_typed(),
                            child = %target.lead_id,
                            error = %err,
                            "child lead repair failed"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        if !report.is_clean() {
            info!(
                quotes_opened = report.quotes_opened,
                orders_linked = report.orders_linked,
                child_leads_created = report.child_leads_created,
                failed = report.failed,
                "repair pass finished"
            );
        }
        report
    }
}

pub fn spawn_repair_job(engine: Arc<WorkflowEngine>, interval: Duration) -> io::Result<WorkerHandle> {
    PeriodicWorker::spawn("workflow-repair", interval, move || {
        let report = engine.repair();
        if report.failed > 0 { Err(report) } else { Ok(()) }
    })
}
