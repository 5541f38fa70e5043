use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use tradedesk_core::{Currency, DomainError, DomainResult, SkuId, TenantId};

/// A sellable item as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub id: SkuId,
    pub seller_id: TenantId,
    pub name: String,
    /// List price in the smallest unit of `currency`.
    pub base_price: u64,
    pub currency: Currency,
    /// Units per package; quantities are not forced to multiples.
    pub pack_size: u32,
    pub active: bool,
    /// Price at `base_price` when no tier applies. Off unless the seller opts in.
    pub list_price_fallback: bool,
}

impl Sku {
    pub fn new(seller_id: TenantId, name: impl Into<String>, base_price: u64, currency: Currency) -> Self {
        Self {
            id: SkuId::new(),
            seller_id,
            name: name.into(),
            base_price,
            currency,
            pack_size: 1,
            active: true,
            list_price_fallback: false,
        }
    }

    pub fn with_list_price_fallback(mut self) -> Self {
        self.list_price_fallback = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Catalog port.
pub trait Catalog: Send + Sync {
    fn get_sku(&self, id: SkuId) -> Option<Sku>;

    fn is_active(&self, id: SkuId) -> bool {
        self.get_sku(id).is_some_and(|s| s.active)
    }
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn get_sku(&self, id: SkuId) -> Option<Sku> {
        (**self).get_sku(id)
    }

    fn is_active(&self, id: SkuId) -> bool {
        (**self).is_active(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    skus: RwLock<HashMap<SkuId, Sku>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, sku: Sku) -> DomainResult<()> {
        if sku.name.trim().is_empty() {
            return Err(DomainError::validation("sku name is required"));
        }
        if sku.base_price == 0 || sku.pack_size == 0 {
            return Err(DomainError::validation("sku base price and pack size must be positive"));
        }
        let mut skus = self
            .skus
            .write()
            .map_err(|_| DomainError::invariant("catalog lock poisoned"))?;
        skus.insert(sku.id, sku);
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn get_sku(&self, id: SkuId) -> Option<Sku> {
        self.skus.read().ok()?.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_and_unknown_skus_are_not_active() {
        let catalog = InMemoryCatalog::new();
        let usd = Currency::new("USD").unwrap();
        let live = Sku::new(TenantId::new(), "Widget", 1_000, usd);
        let retired = Sku::new(TenantId::new(), "Gadget", 500, usd).inactive();
        catalog.upsert(live.clone()).unwrap();
        catalog.upsert(retired.clone()).unwrap();

        assert!(catalog.is_active(live.id));
        assert!(!catalog.is_active(retired.id));
        assert!(!catalog.is_active(SkuId::new()));
        assert!(!live.list_price_fallback);
    }

    #[test]
    fn zero_priced_skus_are_refused() {
        let catalog = InMemoryCatalog::new();
        let sku = Sku::new(TenantId::new(), "Free", 0, Currency::new("USD").unwrap());
        assert!(matches!(catalog.upsert(sku), Err(DomainError::Validation(_))));
    }
}
