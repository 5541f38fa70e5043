//! `tradedesk-auth`: pure authorization boundary for state transitions.
//!
//! Identity is supplied by an external collaborator; this crate only decides
//! whether an already-authenticated actor may perform a transition on a
//! document owned by a seller/buyer pair. Decoupled from HTTP and storage.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Requirement, ResourceOwners, Side, authorize};
pub use principal::{Actor, PrincipalId};
pub use roles::TenantRole;
