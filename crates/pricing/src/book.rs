use std::collections::HashMap;
use std::sync::RwLock;

use tradedesk_core::{Currency, DomainError, DomainResult, SkuId, TenantId};

use crate::tier::{PriceTier, PriceTierId};

/// Read access to stored price tiers.
///
/// Implementations narrow by `(seller, sku, currency)`; scope and
/// activity filtering is the resolver's job.
pub trait PriceBook: Send + Sync {
    fn candidates(&self, seller_id: TenantId, sku_id: SkuId, currency: Currency) -> Vec<PriceTier>;
}

impl<B> PriceBook for std::sync::Arc<B>
where
    B: PriceBook + ?Sized,
{
    fn candidates(&self, seller_id: TenantId, sku_id: SkuId, currency: Currency) -> Vec<PriceTier> {
        (**self).candidates(seller_id, sku_id, currency)
    }
}

type BookKey = (TenantId, SkuId, Currency);

/// In-memory price book for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPriceBook {
    inner: RwLock<HashMap<BookKey, Vec<PriceTier>>>,
}

impl InMemoryPriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tier (matched by id). Invalid tiers are rejected.
    pub fn upsert(&self, tier: PriceTier) -> DomainResult<()> {
        tier.validate()?;
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("price book lock poisoned"))?;
        // A tier may have been re-keyed (e.g. currency edited); drop the old copy.
        for tiers in map.values_mut() {
            tiers.retain(|t| t.id != tier.id);
        }
        map.entry((tier.seller_id, tier.sku_id, tier.currency))
            .or_default()
            .push(tier);
        Ok(())
    }

    pub fn set_active(&self, tier_id: PriceTierId, active: bool) -> DomainResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("price book lock poisoned"))?;
        let tier = map
            .values_mut()
            .flat_map(|tiers| tiers.iter_mut())
            .find(|t| t.id == tier_id)
            .ok_or(DomainError::NotFound)?;
        tier.active = active;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PriceBook for InMemoryPriceBook {
    fn candidates(&self, seller_id: TenantId, sku_id: SkuId, currency: Currency) -> Vec<PriceTier> {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&(seller_id, sku_id, currency)).cloned())
            .unwrap_or_default()
    }
}
