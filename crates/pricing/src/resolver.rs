use serde::{Deserialize, Serialize};
use tracing::debug;

use tradedesk_core::{AddressId, Currency, DomainError, DomainResult, Money, SkuId, TenantId};

use crate::book::PriceBook;
use crate::tier::{PriceTier, PriceTierId};

/// Inputs to one price resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingContext {
    pub seller_id: TenantId,
    pub buyer_id: TenantId,
    pub destination_id: AddressId,
    pub sku_id: SkuId,
    pub currency: Currency,
    pub quantity: u32,
}

/// The chosen unit price and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrice {
    pub unit_price: Money,
    pub tier_id: PriceTierId,
    /// Threshold of the applied breakpoint; `None` when the base price applied.
    pub breakpoint: Option<u32>,
}

/// Resolve a price from an explicit tier set.
///
/// 1. keep active tiers of this seller with the exact SKU and currency
/// 2. drop tiers whose buyer/destination scope excludes the context
/// 3. pick the highest-ranked survivor (see [`PriceTier::rank`])
/// 4. apply the highest breakpoint at or below `quantity`, unless volume
///    discounts are off, in which case the base price applies
pub fn resolve<'a, I>(
    tiers: I,
    ctx: &PricingContext,
    volume_discounts: bool,
) -> DomainResult<ResolvedPrice>
where
    I: IntoIterator<Item = &'a PriceTier>,
{
    if ctx.quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }

    let tier = tiers
        .into_iter()
        .filter(|t| t.active)
        .filter(|t| t.seller_id == ctx.seller_id)
        .filter(|t| t.sku_id == ctx.sku_id && t.currency == ctx.currency)
        .filter(|t| t.admits(ctx.buyer_id, ctx.destination_id))
        .max_by(|a, b| a.rank().cmp(&b.rank()))
        .ok_or_else(|| {
            DomainError::no_pricing(format!(
                "no active tier for sku {} in {} from seller {}",
                ctx.sku_id, ctx.currency, ctx.seller_id
            ))
        })?;

    let breakpoint = if volume_discounts {
        tier.breakpoint_for(ctx.quantity)
    } else {
        None
    };
    let unit_price = breakpoint.map_or(tier.base_price, |bp| bp.unit_price);

    Ok(ResolvedPrice {
        unit_price: Money::new(unit_price, ctx.currency),
        tier_id: tier.id,
        breakpoint: breakpoint.map(|bp| bp.min_quantity),
    })
}

/// Resolver bound to a [`PriceBook`].
#[derive(Debug, Clone)]
pub struct PriceTierResolver<B> {
    book: B,
}

impl<B: PriceBook> PriceTierResolver<B> {
    pub fn new(book: B) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &B {
        &self.book
    }

    pub fn resolve(&self, ctx: &PricingContext, volume_discounts: bool) -> DomainResult<ResolvedPrice> {
        let candidates = self
            .book
            .candidates(ctx.seller_id, ctx.sku_id, ctx.currency);
        let resolved = resolve(&candidates, ctx, volume_discounts)?;
        debug!(
            seller_id = %ctx.seller_id,
            sku_id = %ctx.sku_id,
            quantity = ctx.quantity,
            tier_id = %resolved.tier_id,
            unit_price = resolved.unit_price.amount,
            "price resolved"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::InMemoryPriceBook;
    use crate::tier::Breakpoint;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    struct Fixture {
        seller: TenantId,
        buyer: TenantId,
        dest: AddressId,
        sku: SkuId,
        usd: Currency,
    }

    fn fixture() -> Fixture {
        Fixture {
            seller: TenantId::new(),
            buyer: TenantId::new(),
            dest: AddressId::new(),
            sku: SkuId::new(),
            usd: Currency::new("USD").unwrap(),
        }
    }

    fn ctx(f: &Fixture, quantity: u32) -> PricingContext {
        PricingContext {
            seller_id: f.seller,
            buyer_id: f.buyer,
            destination_id: f.dest,
            sku_id: f.sku,
            currency: f.usd,
            quantity,
        }
    }

    fn base(f: &Fixture, price: u64) -> PriceTier {
        PriceTier::seller_wide(
            f.seller,
            f.sku,
            f.usd,
            price,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn bp(min_quantity: u32, unit_price: u64) -> Breakpoint {
        Breakpoint {
            min_quantity,
            unit_price,
        }
    }

    #[test]
    fn buyer_destination_tier_with_breakpoints_prices_large_order() {
        let f = fixture();
        let t1 = base(&f, 1000)
            .for_buyer(f.buyer)
            .for_destination(f.dest)
            .with_breakpoints(vec![bp(1, 1000), bp(100, 850)]);
        let seller_wide = base(&f, 1200);

        let resolved = resolve([&seller_wide, &t1], &ctx(&f, 150), true).unwrap();

        assert_eq!(resolved.unit_price, Money::new(850, f.usd));
        assert_eq!(resolved.tier_id, t1.id);
        assert_eq!(resolved.breakpoint, Some(100));
    }

    #[test]
    fn more_specific_scope_wins_over_newer_general_tier() {
        let f = fixture();
        let buyer_tier = base(&f, 900).for_buyer(f.buyer);
        let mut newer_wide = base(&f, 500);
        newer_wide.created_at += Duration::days(30);
        let dest_tier = base(&f, 700).for_destination(f.dest);

        let resolved = resolve([&newer_wide, &dest_tier, &buyer_tier], &ctx(&f, 1), true).unwrap();
        assert_eq!(resolved.tier_id, buyer_tier.id);

        let resolved = resolve([&newer_wide, &dest_tier], &ctx(&f, 1), true).unwrap();
        assert_eq!(resolved.tier_id, dest_tier.id);
    }

    #[test]
    fn equal_specificity_prefers_most_recent_then_highest_id() {
        let f = fixture();
        let older = base(&f, 900);
        let mut newer = base(&f, 800);
        newer.created_at += Duration::seconds(1);
        assert_eq!(
            resolve([&newer, &older], &ctx(&f, 1), true).unwrap().tier_id,
            newer.id
        );

        let mut twin = older.clone();
        twin.id = PriceTierId::new();
        let expected = older.id.max(twin.id);
        assert_eq!(resolve([&older, &twin], &ctx(&f, 1), true).unwrap().tier_id, expected);
        assert_eq!(resolve([&twin, &older], &ctx(&f, 1), true).unwrap().tier_id, expected);
    }

    #[test]
    fn inactive_foreign_currency_and_other_buyer_tiers_are_ignored() {
        let f = fixture();
        let mut inactive = base(&f, 100);
        inactive.active = false;
        let mut eur = base(&f, 100);
        eur.currency = Currency::new("EUR").unwrap();
        let other_buyer = base(&f, 100).for_buyer(TenantId::new());

        let err = resolve([&inactive, &eur, &other_buyer], &ctx(&f, 5), true).unwrap_err();
        assert!(matches!(err, DomainError::NoPricingAvailable(_)));
    }

    #[test]
    fn disabled_volume_discounts_use_base_price() {
        let f = fixture();
        let t = base(&f, 1000).with_breakpoints(vec![bp(10, 800)]);
        let resolved = resolve([&t], &ctx(&f, 50), false).unwrap();
        assert_eq!(resolved.unit_price.amount, 1000);
        assert_eq!(resolved.breakpoint, None);
    }

    #[test]
    fn zero_quantity_is_a_validation_error() {
        let f = fixture();
        let t = base(&f, 1000);
        assert!(matches!(
            resolve([&t], &ctx(&f, 0), true),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn resolver_reads_through_price_book() {
        let f = fixture();
        let book = InMemoryPriceBook::new();
        let t = base(&f, 1000).with_breakpoints(vec![bp(100, 850)]);
        book.upsert(t.clone()).unwrap();
        let resolver = PriceTierResolver::new(book);

        let resolved = resolver.resolve(&ctx(&f, 150), true).unwrap();
        assert_eq!(resolved.tier_id, t.id);
        assert_eq!(resolved.unit_price.amount, 850);

        resolver.book().set_active(t.id, false).unwrap();
        assert!(matches!(
            resolver.resolve(&ctx(&f, 150), true),
            Err(DomainError::NoPricingAvailable(_))
        ));
    }

    fn arb_breakpoints() -> impl Strategy<Value = (u64, Vec<Breakpoint>)> {
        (1_000u64..100_000, prop::collection::vec((1u32..50, 0u64..100), 0..8)).prop_map(
            |(base_price, steps)| {
                let mut qty = 0u32;
                let mut price = base_price;
                let bps = steps
                    .into_iter()
                    .map(|(dq, dp)| {
                        qty += dq;
                        price = price.saturating_sub(dp).max(1);
                        bp(qty, price)
                    })
                    .collect();
                (base_price, bps)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: unit price never increases as quantity increases.
        #[test]
        fn unit_price_is_non_increasing_in_quantity(
            (base_price, breakpoints) in arb_breakpoints(),
            q1 in 1u32..500,
            dq in 0u32..500,
        ) {
            let f = fixture();
            let t = base(&f, base_price).with_breakpoints(breakpoints);
            prop_assert!(t.validate().is_ok());

            let small = resolve([&t], &ctx(&f, q1), true).unwrap();
            let large = resolve([&t], &ctx(&f, q1 + dq), true).unwrap();
            prop_assert!(large.unit_price.amount <= small.unit_price.amount);
        }

        /// Property: resolution is independent of candidate order and repeatable.
        #[test]
        fn resolution_is_deterministic(
            prices in prop::collection::vec(1u64..10_000, 1..6),
            scoped in prop::collection::vec(0u8..4, 1..6),
            quantity in 1u32..1_000,
        ) {
            let f = fixture();
            let tiers: Vec<PriceTier> = prices
                .iter()
                .zip(scoped.iter().cycle())
                .map(|(p, s)| {
                    let t = base(&f, *p);
                    match s {
                        1 => t.for_destination(f.dest),
                        2 => t.for_buyer(f.buyer),
                        3 => t.for_buyer(f.buyer).for_destination(f.dest),
                        _ => t,
                    }
                })
                .collect();

            let forward = resolve(tiers.iter(), &ctx(&f, quantity), true).unwrap();
            let again = resolve(tiers.iter(), &ctx(&f, quantity), true).unwrap();
            let reversed = resolve(tiers.iter().rev(), &ctx(&f, quantity), true).unwrap();
            prop_assert_eq!(forward, again);
            prop_assert_eq!(forward, reversed);
        }
    }
}
