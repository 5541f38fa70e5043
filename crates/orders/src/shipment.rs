use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_core::{DomainError, DomainResult};

/// Out-of-band notice that the seller has handed goods to a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentAdvice {
    pub carrier: String,
    pub tracking_number: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ShipmentAdvice {
    pub fn new(carrier: impl Into<String>, tracking_number: impl Into<String>) -> Self {
        Self {
            carrier: carrier.into(),
            tracking_number: tracking_number.into(),
            shipped_at: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.carrier.trim().is_empty() {
            return Err(DomainError::validation("shipment advice needs a carrier"));
        }
        if self.tracking_number.trim().is_empty() {
            return Err(DomainError::validation("shipment advice needs a tracking number"));
        }
        Ok(())
    }
}
