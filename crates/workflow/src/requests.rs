//! Caller-facing inputs and small outputs of the workflow API.

use serde::{Deserialize, Serialize};

use tradedesk_core::{AddressId, Currency, Money, SkuId, StorefrontId, TenantId};
use tradedesk_leads::ConversionTerms;
use tradedesk_orders::ShipmentAdvice;
use tradedesk_pricing::PriceTierId;
use tradedesk_quotes::LineUpdate;

/// Seller-side lead transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LeadAction {
    Contact,
    Qualify,
    MarkLost { reason_code: String },
}

/// Who the quote is between and where the goods go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub buyer_id: TenantId,
    pub destination_id: AddressId,
    pub currency: Currency,
    pub storefront_id: Option<StorefrontId>,
}

impl QuoteRequest {
    pub fn terms(&self) -> ConversionTerms {
        ConversionTerms {
            buyer_id: self.buyer_id,
            destination_id: self.destination_id,
            currency: self.currency,
            storefront_id: self.storefront_id,
        }
    }
}

impl From<ConversionTerms> for QuoteRequest {
    fn from(terms: ConversionTerms) -> Self {
        Self {
            buyer_id: terms.buyer_id,
            destination_id: terms.destination_id,
            currency: terms.currency,
            storefront_id: terms.storefront_id,
        }
    }
}

/// A requested quote line; the unit price is resolved at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub sku_id: SkuId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(sku_id: SkuId, quantity: u32) -> Self {
        Self { sku_id, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QuoteResponse {
    Counter {
        updates: Vec<LineUpdate>,
        shipping_cost: Option<u64>,
    },
    Accept,
    Reject {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderAction {
    Confirm,
    AttachShipmentAdvice { advice: ShipmentAdvice },
    Ship { advice: Option<ShipmentAdvice> },
    ConfirmDelivery,
    Cancel { reason: String },
}

/// A buyer's cart for direct checkout with one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub seller_id: TenantId,
    pub buyer_id: TenantId,
    pub storefront_id: Option<StorefrontId>,
    pub destination_id: AddressId,
    pub currency: Currency,
    pub lines: Vec<LineRequest>,
    pub shipping_cost: u64,
}

/// Where a line price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PriceSource {
    Tier {
        tier_id: PriceTierId,
        breakpoint: Option<u32>,
    },
    /// Catalog base price, used only for SKUs that opt in.
    ListPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinePrice {
    pub unit_price: Money,
    pub source: PriceSource,
}

impl LinePrice {
    pub fn tier_id(&self) -> Option<PriceTierId> {
        match self.source {
            PriceSource::Tier { tier_id, .. } => Some(tier_id),
            PriceSource::ListPrice => None,
        }
    }
}
