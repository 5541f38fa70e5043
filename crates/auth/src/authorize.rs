use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradedesk_core::{DomainError, TenantId};

use crate::{Actor, TenantRole};

/// The tenants that own a negotiation document.
///
/// A lead may not have a registered buyer tenant (only a contact email).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOwners {
    pub seller: TenantId,
    pub buyer: Option<TenantId>,
}

impl ResourceOwners {
    pub fn new(seller: TenantId, buyer: Option<TenantId>) -> Self {
        Self { seller, buyer }
    }
}

/// Which side a transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    SellerOnly,
    BuyerOnly,
    EitherParty,
    /// Either party, or an internal process.
    PartyOrSystem,
    SystemOnly,
}

/// The side an authorized actor acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Seller,
    Buyer,
    System,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Seller => "SELLER",
            Side::Buyer => "BUYER",
            Side::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant {0} is not a party to this document")]
    NotAParty(TenantId),

    #[error("role {role} may not act as {side:?}")]
    RoleMismatch { role: TenantRole, side: Side },

    #[error("{0} is restricted to the seller")]
    SellerOnly(String),

    #[error("{0} is restricted to the buyer")]
    BuyerOnly(String),

    #[error("{0} may only be performed by an internal process")]
    SystemOnly(String),

    #[error("internal process '{0}' may not perform a party transition")]
    PartiesOnly(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::AuthorizationDenied(value.to_string())
    }
}

/// Decide whether `actor` may perform a transition requiring `required` on a
/// document owned by `owners`. Returns the side the actor acted on.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(
    actor: &Actor,
    owners: &ResourceOwners,
    required: Requirement,
) -> Result<Side, AuthzError> {
    let (tenant_id, role) = match actor {
        Actor::System { process } => {
            return match required {
                Requirement::PartyOrSystem | Requirement::SystemOnly => Ok(Side::System),
                _ => Err(AuthzError::PartiesOnly(process.clone())),
            };
        }
        Actor::Tenant {
            tenant_id, role, ..
        } => (*tenant_id, *role),
    };

    let side = side_of(tenant_id, owners).ok_or(AuthzError::NotAParty(tenant_id))?;

    match (required, side) {
        (Requirement::SystemOnly, _) => {
            return Err(AuthzError::SystemOnly("transition".to_string()));
        }
        (Requirement::SellerOnly, Side::Buyer) => {
            return Err(AuthzError::SellerOnly("transition".to_string()));
        }
        (Requirement::BuyerOnly, Side::Seller) => {
            return Err(AuthzError::BuyerOnly("transition".to_string()));
        }
        _ => {}
    }

    let role_ok = match side {
        Side::Seller => role.can_sell(),
        Side::Buyer => role.can_buy(),
        Side::System => false,
    };
    if !role_ok {
        return Err(AuthzError::RoleMismatch { role, side });
    }

    Ok(side)
}

fn side_of(tenant_id: TenantId, owners: &ResourceOwners) -> Option<Side> {
    if tenant_id == owners.seller {
        Some(Side::Seller)
    } else if owners.buyer == Some(tenant_id) {
        Some(Side::Buyer)
    } else {
        None
    }
}
