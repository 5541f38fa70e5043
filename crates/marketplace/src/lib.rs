//! Marketplace policy: the effective feature-flag set for a seller.
//!
//! One globally active [`MarketplaceConfig`] is merged with the seller's
//! [`SellerMarketplace`] overrides. Overrides win field-by-field when set;
//! unset fields inherit the global value.

pub mod config;
pub mod policy;
pub mod registry;

pub use config::{ConfigId, MAX_QUOTE_TTL_HOURS, MarketplaceConfig, PolicyOverrides, SellerMarketplace};
pub use policy::Policy;
pub use registry::{InMemoryMarketplaceRegistry, PolicySource, resolve_policy};
