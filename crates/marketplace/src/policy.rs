use serde::Serialize;

use tradedesk_core::TenantId;

use crate::config::{ConfigId, MarketplaceConfig, SellerMarketplace};

/// Effective, merged policy for one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub seller_id: TenantId,
    pub source_config: ConfigId,
    pub require_quote_approval: bool,
    pub auto_approve_quotes: bool,
    pub skip_quote_for_direct: bool,
    pub enable_volume_discounts: bool,
    pub enable_direct_purchase: bool,
    pub allow_associationless_requests: bool,
    pub min_order_value: u64,
    pub max_cart_items: u32,
    pub quote_ttl_hours: u32,
    pub auto_accept_orders: bool,
    /// Field names whose value came from the seller override (audit trail).
    pub overridden: Vec<&'static str>,
}

/// Take the override when present, recording which field it replaced.
fn pick<T: Copy>(
    overridden: &mut Vec<&'static str>,
    field: &'static str,
    global: T,
    seller: Option<T>,
) -> T {
    match seller {
        Some(v) => {
            overridden.push(field);
            v
        }
        None => global,
    }
}

impl Policy {
    /// Merge the global config with a seller's overrides (seller wins when set).
    pub fn merge(
        seller_id: TenantId,
        global: &MarketplaceConfig,
        seller: Option<&SellerMarketplace>,
    ) -> Policy {
        let o = seller.map(|s| s.overrides.clone()).unwrap_or_default();
        let mut overridden = Vec::new();
        let ov = &mut overridden;

        Policy {
            seller_id,
            source_config: global.config_id,
            require_quote_approval: pick(
                ov,
                "requireQuoteApproval",
                global.require_quote_approval,
                o.require_quote_approval,
            ),
            auto_approve_quotes: pick(
                ov,
                "autoApproveQuotes",
                global.auto_approve_quotes,
                o.auto_approve_quotes,
            ),
            skip_quote_for_direct: pick(
                ov,
                "skipQuoteForDirect",
                global.skip_quote_for_direct,
                o.skip_quote_for_direct,
            ),
            enable_volume_discounts: pick(
                ov,
                "enableVolumeDiscounts",
                global.enable_volume_discounts,
                o.enable_volume_discounts,
            ),
            enable_direct_purchase: pick(
                ov,
                "enableDirectPurchase",
                global.enable_direct_purchase,
                o.enable_direct_purchase,
            ),
            allow_associationless_requests: pick(
                ov,
                "allowAssociationlessRequests",
                global.allow_associationless_requests,
                o.allow_associationless_requests,
            ),
            min_order_value: pick(ov, "minOrderValue", global.min_order_value, o.min_order_value),
            max_cart_items: pick(ov, "maxCartItems", global.max_cart_items, o.max_cart_items),
            quote_ttl_hours: pick(ov, "quoteTtlHours", global.quote_ttl_hours, o.quote_ttl_hours),
            auto_accept_orders: seller.map(|s| s.auto_accept_orders).unwrap_or(false),
            overridden,
        }
    }

    /// Direct checkout may bypass quoting only when both flags allow it.
    pub fn allows_direct_checkout(&self) -> bool {
        self.enable_direct_purchase && self.skip_quote_for_direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyOverrides;
    use proptest::prelude::*;

    #[test]
    fn no_overrides_inherits_everything() {
        let global = MarketplaceConfig::default();
        let seller = TenantId::new();
        let policy = Policy::merge(seller, &global, None);

        assert_eq!(policy.require_quote_approval, global.require_quote_approval);
        assert_eq!(policy.max_cart_items, global.max_cart_items);
        assert!(policy.overridden.is_empty());
        assert!(!policy.auto_accept_orders);
    }

    #[test]
    fn set_override_replaces_only_that_field() {
        let global = MarketplaceConfig {
            skip_quote_for_direct: false,
            enable_direct_purchase: true,
            ..MarketplaceConfig::default()
        };
        let seller_id = TenantId::new();
        let mut seller = SellerMarketplace::new(seller_id);
        seller.overrides.skip_quote_for_direct = Some(true);
        seller.auto_accept_orders = true;

        let policy = Policy::merge(seller_id, &global, Some(&seller));

        assert!(policy.skip_quote_for_direct);
        assert!(policy.allows_direct_checkout());
        assert_eq!(policy.enable_volume_discounts, global.enable_volume_discounts);
        assert_eq!(policy.overridden, vec!["skipQuoteForDirect"]);
        assert!(policy.auto_accept_orders);
    }

    #[test]
    fn override_can_turn_a_flag_off() {
        let global = MarketplaceConfig {
            enable_volume_discounts: true,
            ..MarketplaceConfig::default()
        };
        let seller_id = TenantId::new();
        let mut seller = SellerMarketplace::new(seller_id);
        seller.overrides = PolicyOverrides {
            enable_volume_discounts: Some(false),
            ..PolicyOverrides::default()
        };

        let policy = Policy::merge(seller_id, &global, Some(&seller));
        assert!(!policy.enable_volume_discounts);
    }

    proptest! {
        /// Property: each field equals the override when set, else the global value.
        #[test]
        fn seller_value_wins_field_by_field(
            global_flag in any::<bool>(),
            override_flag in proptest::option::of(any::<bool>()),
            global_min in 0u64..1_000_000,
            override_min in proptest::option::of(0u64..1_000_000),
        ) {
            let global = MarketplaceConfig {
                auto_approve_quotes: global_flag,
                min_order_value: global_min,
                ..MarketplaceConfig::default()
            };
            let seller_id = TenantId::new();
            let mut seller = SellerMarketplace::new(seller_id);
            seller.overrides.auto_approve_quotes = override_flag;
            seller.overrides.min_order_value = override_min;

            let policy = Policy::merge(seller_id, &global, Some(&seller));

            prop_assert_eq!(policy.auto_approve_quotes, override_flag.unwrap_or(global_flag));
            prop_assert_eq!(policy.min_order_value, override_min.unwrap_or(global_min));
        }
    }
}
