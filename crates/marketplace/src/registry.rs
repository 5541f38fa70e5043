//! Active-config registry and policy resolution.
//!
//! The registry holds any number of config rows but exactly one active slot,
//! so "which config is active" is never ambiguous.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::error;

use tradedesk_core::{DomainError, DomainResult, TenantId};

use crate::config::{ConfigId, MarketplaceConfig, SellerMarketplace};
use crate::policy::Policy;

/// Read-only source of marketplace configuration.
pub trait PolicySource: Send + Sync {
    fn active_config(&self) -> Option<MarketplaceConfig>;
    fn seller_marketplace(&self, seller_id: TenantId) -> Option<SellerMarketplace>;
}

impl<S> PolicySource for std::sync::Arc<S>
where
    S: PolicySource + ?Sized,
{
    fn active_config(&self) -> Option<MarketplaceConfig> {
        (**self).active_config()
    }

    fn seller_marketplace(&self, seller_id: TenantId) -> Option<SellerMarketplace> {
        (**self).seller_marketplace(seller_id)
    }
}

/// Resolve the effective policy for `seller_id`.
///
/// Read-only. Fails with `ConfigurationError` when no global config is active;
/// that is an operator problem, not something a request can recover from.
pub fn resolve_policy<P>(source: &P, seller_id: TenantId) -> DomainResult<Policy>
where
    P: PolicySource + ?Sized,
{
    let Some(global) = source.active_config() else {
        error!(seller_id = %seller_id, "no active marketplace config");
        return Err(DomainError::configuration("no active marketplace config"));
    };
    let seller = source.seller_marketplace(seller_id);
    Ok(Policy::merge(seller_id, &global, seller.as_ref()))
}

#[derive(Debug, Default)]
struct RegistryState {
    configs: HashMap<ConfigId, MarketplaceConfig>,
    active: Option<ConfigId>,
    sellers: HashMap<TenantId, SellerMarketplace>,
}

/// In-memory registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMarketplaceRegistry {
    inner: RwLock<RegistryState>,
}

impl InMemoryMarketplaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, RegistryState>> {
        self.inner
            .write()
            .map_err(|_| DomainError::invariant("marketplace registry lock poisoned"))
    }

    /// Insert or replace a config row without changing which row is active.
    pub fn upsert_config(&self, config: MarketplaceConfig) -> DomainResult<()> {
        config.validate()?;
        self.write()?.configs.insert(config.config_id, config);
        Ok(())
    }

    /// Make `config_id` the single active config (any previous one is deactivated).
    pub fn activate(&self, config_id: ConfigId) -> DomainResult<()> {
        let mut state = self.write()?;
        if !state.configs.contains_key(&config_id) {
            return Err(DomainError::not_found());
        }
        state.active = Some(config_id);
        Ok(())
    }

    /// Insert a config and activate it in one write.
    pub fn publish(&self, config: MarketplaceConfig) -> DomainResult<()> {
        config.validate()?;
        let mut state = self.write()?;
        state.active = Some(config.config_id);
        state.configs.insert(config.config_id, config);
        Ok(())
    }

    pub fn deactivate(&self) -> DomainResult<()> {
        self.write()?.active = None;
        Ok(())
    }

    pub fn active_config_id(&self) -> Option<ConfigId> {
        self.inner.read().ok().and_then(|s| s.active)
    }

    pub fn upsert_seller(&self, seller: SellerMarketplace) -> DomainResult<()> {
        seller.validate()?;
        self.write()?.sellers.insert(seller.seller_id, seller);
        Ok(())
    }
}

impl PolicySource for InMemoryMarketplaceRegistry {
    fn active_config(&self) -> Option<MarketplaceConfig> {
        let state = self.inner.read().ok()?;
        state.active.and_then(|id| state.configs.get(&id).cloned())
    }

    fn seller_marketplace(&self, seller_id: TenantId) -> Option<SellerMarketplace> {
        self.inner.read().ok()?.sellers.get(&seller_id).cloned()
    }
}
