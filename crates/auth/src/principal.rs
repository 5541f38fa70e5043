use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradedesk_core::TenantId;

use crate::TenantRole;

/// Identity of an authenticated principal (human user, service account, etc).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Who is performing a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// A principal acting on behalf of its tenant.
    Tenant {
        principal_id: PrincipalId,
        tenant_id: TenantId,
        role: TenantRole,
    },
    /// An internal process (expiry sweep, carrier webhook, repair job).
    System { process: String },
}

impl Actor {
    pub fn tenant(tenant_id: TenantId, role: TenantRole) -> Self {
        Self::Tenant {
            principal_id: PrincipalId::new(),
            tenant_id,
            role,
        }
    }

    pub fn seller(tenant_id: TenantId) -> Self {
        Self::tenant(tenant_id, TenantRole::Seller)
    }

    pub fn buyer(tenant_id: TenantId) -> Self {
        Self::tenant(tenant_id, TenantRole::Buyer)
    }

    pub fn system(process: impl Into<String>) -> Self {
        Self::System {
            process: process.into(),
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Actor::Tenant { tenant_id, .. } => Some(*tenant_id),
            Actor::System { .. } => None,
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::Tenant {
                tenant_id, role, ..
            } => write!(f, "{role}:{tenant_id}"),
            Actor::System { process } => write!(f, "system:{process}"),
        }
    }
}
