use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradedesk_core::{AddressId, Currency, DomainError, DomainResult, SkuId, TenantId};

/// Identifier of a price tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTierId(pub Uuid);

impl PriceTierId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PriceTierId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PriceTierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Quantity threshold unlocking a unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub min_quantity: u32,
    /// Smallest currency unit.
    pub unit_price: u64,
}

/// How narrowly a tier is scoped, ordered from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierScope {
    /// `(*, *)`: every buyer, every destination.
    SellerWide,
    /// `(*, destination)`.
    Destination,
    /// `(buyer, *)`.
    Buyer,
    /// `(buyer, destination)`.
    BuyerDestination,
}

impl TierScope {
    pub fn specificity(&self) -> u8 {
        match self {
            TierScope::SellerWide => 0,
            TierScope::Destination => 1,
            TierScope::Buyer => 2,
            TierScope::BuyerDestination => 3,
        }
    }
}

/// A seller's volume price rule for one SKU in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    pub id: PriceTierId,
    pub seller_id: TenantId,
    pub buyer_id: Option<TenantId>,
    pub destination_id: Option<AddressId>,
    pub sku_id: SkuId,
    pub currency: Currency,
    pub active: bool,
    /// Price below the first breakpoint, and the only price when volume
    /// discounts are disabled.
    pub base_price: u64,
    /// Sorted ascending by `min_quantity`.
    pub breakpoints: Vec<Breakpoint>,
    pub created_at: DateTime<Utc>,
}

impl PriceTier {
    /// A seller-wide tier with no breakpoints.
    pub fn seller_wide(
        seller_id: TenantId,
        sku_id: SkuId,
        currency: Currency,
        base_price: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PriceTierId::new(),
            seller_id,
            buyer_id: None,
            destination_id: None,
            sku_id,
            currency,
            active: true,
            base_price,
            breakpoints: Vec::new(),
            created_at,
        }
    }

    pub fn for_buyer(mut self, buyer_id: TenantId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn for_destination(mut self, destination_id: AddressId) -> Self {
        self.destination_id = Some(destination_id);
        self
    }

    pub fn with_breakpoints(mut self, breakpoints: Vec<Breakpoint>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    pub fn scope(&self) -> TierScope {
        match (self.buyer_id, self.destination_id) {
            (Some(_), Some(_)) => TierScope::BuyerDestination,
            (Some(_), None) => TierScope::Buyer,
            (None, Some(_)) => TierScope::Destination,
            (None, None) => TierScope::SellerWide,
        }
    }

    /// Reject tiers that could price a larger order higher than a smaller one.
    pub fn validate(&self) -> DomainResult<()> {
        if self.base_price == 0 {
            return Err(DomainError::validation("tier base price must be positive"));
        }
        let mut prev_qty = 0u32;
        let mut prev_price = self.base_price;
        for bp in &self.breakpoints {
            if bp.min_quantity == 0 || bp.min_quantity <= prev_qty {
                return Err(DomainError::validation(
                    "breakpoint quantities must be positive and strictly increasing",
                ));
            }
            if bp.unit_price == 0 || bp.unit_price > prev_price {
                return Err(DomainError::validation(
                    "breakpoint prices must be positive and non-increasing",
                ));
            }
            prev_qty = bp.min_quantity;
            prev_price = bp.unit_price;
        }
        Ok(())
    }

    /// Whether the tier's scope admits this buyer and destination.
    pub fn admits(&self, buyer_id: TenantId, destination_id: AddressId) -> bool {
        self.buyer_id.is_none_or(|b| b == buyer_id)
            && self.destination_id.is_none_or(|d| d == destination_id)
    }

    /// Highest breakpoint whose threshold is at or below `quantity`.
    pub fn breakpoint_for(&self, quantity: u32) -> Option<Breakpoint> {
        self.breakpoints
            .iter()
            .copied()
            .filter(|bp| bp.min_quantity <= quantity)
            .max_by_key(|bp| bp.min_quantity)
    }

    /// Total order used to pick one tier among candidates.
    ///
    /// Most specific first, then most recently created, then highest id.
    pub(crate) fn rank(&self) -> (u8, DateTime<Utc>, PriceTierId) {
        (self.scope().specificity(), self.created_at, self.id)
    }
}
