use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradedesk_core::{DomainError, DomainResult, StorefrontId, TenantId};

/// Identifier of a marketplace configuration row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub Uuid);

impl ConfigId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConfigId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Longest quote lifetime a config may ask for (ten years).
pub const MAX_QUOTE_TTL_HOURS: u32 = 24 * 365 * 10;

fn check_ttl(hours: u32, field: &str) -> DomainResult<()> {
    if hours == 0 {
        return Err(DomainError::validation(format!("{field} must be positive")));
    }
    if hours > MAX_QUOTE_TTL_HOURS {
        return Err(DomainError::validation(format!(
            "{field} must be at most {MAX_QUOTE_TTL_HOURS}"
        )));
    }
    Ok(())
}

/// Process-wide marketplace feature flags and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceConfig {
    pub config_id: ConfigId,
    /// When false, a submitted quote is accepted without any review round.
    pub require_quote_approval: bool,
    /// Seller review accepts the buyer's terms automatically.
    pub auto_approve_quotes: bool,
    /// Direct checkout may bypass the quote workflow.
    pub skip_quote_for_direct: bool,
    pub enable_volume_discounts: bool,
    pub enable_direct_purchase: bool,
    /// Negotiation without an active seller/buyer association.
    pub allow_associationless_requests: bool,
    /// Smallest currency unit; 0 disables the minimum.
    pub min_order_value: u64,
    pub max_cart_items: u32,
    pub quote_ttl_hours: u32,
}

impl MarketplaceConfig {
    pub fn validate(&self) -> DomainResult<()> {
        if self.max_cart_items == 0 {
            return Err(DomainError::validation("maxCartItems must be positive"));
        }
        check_ttl(self.quote_ttl_hours, "quoteTtlHours")
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            config_id: ConfigId::new(),
            require_quote_approval: true,
            auto_approve_quotes: false,
            skip_quote_for_direct: false,
            enable_volume_discounts: true,
            enable_direct_purchase: false,
            allow_associationless_requests: false,
            min_order_value: 0,
            max_cart_items: 100,
            quote_ttl_hours: 24 * 14,
        }
    }
}

/// Optional per-seller replacements for global fields (`None` inherits).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverrides {
    pub require_quote_approval: Option<bool>,
    pub auto_approve_quotes: Option<bool>,
    pub skip_quote_for_direct: Option<bool>,
    pub enable_volume_discounts: Option<bool>,
    pub enable_direct_purchase: Option<bool>,
    pub allow_associationless_requests: Option<bool>,
    pub min_order_value: Option<u64>,
    pub max_cart_items: Option<u32>,
    pub quote_ttl_hours: Option<u32>,
}

/// A seller's storefront settings within the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerMarketplace {
    pub seller_id: TenantId,
    pub storefront_id: Option<StorefrontId>,
    pub overrides: PolicyOverrides,
    /// Placed orders are confirmed without a seller action.
    pub auto_accept_orders: bool,
}

impl SellerMarketplace {
    pub fn new(seller_id: TenantId) -> Self {
        Self {
            seller_id,
            storefront_id: None,
            overrides: PolicyOverrides::default(),
            auto_accept_orders: false,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.overrides.max_cart_items == Some(0) {
            return Err(DomainError::validation("maxCartItems override must be positive"));
        }
        match self.overrides.quote_ttl_hours {
            Some(hours) => check_ttl(hours, "quoteTtlHours override"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ttl_is_bounded_on_both_ends() {
        for hours in [0, MAX_QUOTE_TTL_HOURS + 1, u32::MAX] {
            let config = MarketplaceConfig {
                quote_ttl_hours: hours,
                ..MarketplaceConfig::default()
            };
            assert!(matches!(config.validate(), Err(DomainError::Validation(_))), "{hours}");

            let mut seller = SellerMarketplace::new(TenantId::new());
            seller.overrides.quote_ttl_hours = Some(hours);
            assert!(matches!(seller.validate(), Err(DomainError::Validation(_))), "{hours}");
        }

        let longest = MarketplaceConfig {
            quote_ttl_hours: MAX_QUOTE_TTL_HOURS,
            ..MarketplaceConfig::default()
        };
        assert!(longest.validate().is_ok());
    }
}
