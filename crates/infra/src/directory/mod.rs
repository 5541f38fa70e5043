//! Ports to the collaborators the engine consults but does not own:
//! the product catalog and the tenant association store.

pub mod associations;
pub mod catalog;

pub use associations::{AssociationStore, InMemoryAssociationStore, TenantAssociation};
pub use catalog::{Catalog, InMemoryCatalog, Sku};
