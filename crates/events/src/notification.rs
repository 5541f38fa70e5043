//! Counter-party notifications (fire-and-forget).
//!
//! A notification is sent after a transition has been committed. Delivery
//! failures are reported to the caller so it can queue a retry, but they
//! never roll back the transition that triggered them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tradedesk_core::{AggregateId, TenantId};

use crate::{EventBus, TenantScoped};

/// A message addressed to one tenant about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub recipient: TenantId,
    /// Stable topic, e.g. "quotes.quote.countered".
    pub topic: String,
    pub subject_id: AggregateId,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: TenantId,
        topic: impl Into<String>,
        subject_id: AggregateId,
        summary: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            recipient,
            topic: topic.into(),
            subject_id,
            summary: summary.into(),
            occurred_at,
        }
    }
}

impl TenantScoped for Notification {
    fn tenant_id(&self) -> TenantId {
        self.recipient
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Notification dispatcher port.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that publishes onto an [`EventBus`] of notifications.
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<Notification>,
{
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.bus
            .publish(notification.clone())
            .map_err(|e| NotifyError::Unavailable(format!("{e:?}")))
    }
}
