//! Price Tier Resolver.
//!
//! Given `(seller, buyer, destination, sku, currency, quantity)`, picks the
//! single most specific active tier and its applicable volume breakpoint.
//! Resolution is read-only and deterministic: the same inputs against the
//! same tier data always yield the same `(unit_price, tier_id)`.

pub mod book;
pub mod resolver;
pub mod tier;

pub use book::{InMemoryPriceBook, PriceBook};
pub use resolver::{PriceTierResolver, PricingContext, ResolvedPrice, resolve};
pub use tier::{Breakpoint, PriceTier, PriceTierId, TierScope};
