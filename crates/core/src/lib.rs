//! `tradedesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, the aggregate contract and the shared error taxonomy.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AddressId, AggregateId, SkuId, StorefrontId, TenantId};
pub use value_object::{Currency, Money, ValueObject};
