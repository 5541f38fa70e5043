use serde::{Deserialize, Serialize};

/// The role a tenant plays in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantRole {
    Seller,
    Buyer,
    /// Resells: may act on either side of a negotiation it is party to.
    Distributor,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::Seller => "SELLER",
            TenantRole::Buyer => "BUYER",
            TenantRole::Distributor => "DISTRIBUTOR",
        }
    }

    pub fn can_sell(&self) -> bool {
        matches!(self, TenantRole::Seller | TenantRole::Distributor)
    }

    pub fn can_buy(&self) -> bool {
        matches!(self, TenantRole::Buyer | TenantRole::Distributor)
    }
}

impl core::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
