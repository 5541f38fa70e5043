use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_core::{DomainError, DomainResult, StorefrontId, TenantId};

/// A commercial relationship between a seller and a buyer.
///
/// `storefront_id: None` covers every storefront of the seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAssociation {
    pub seller_id: TenantId,
    pub buyer_id: TenantId,
    pub storefront_id: Option<StorefrontId>,
    pub active: bool,
    pub since: DateTime<Utc>,
}

impl TenantAssociation {
    pub fn active(seller_id: TenantId, buyer_id: TenantId) -> Self {
        Self {
            seller_id,
            buyer_id,
            storefront_id: None,
            active: true,
            since: Utc::now(),
        }
    }

    pub fn for_storefront(mut self, storefront_id: StorefrontId) -> Self {
        self.storefront_id = Some(storefront_id);
        self
    }

    fn covers(&self, seller_id: TenantId, buyer_id: TenantId, storefront_id: Option<StorefrontId>) -> bool {
        self.active
            && self.seller_id == seller_id
            && self.buyer_id == buyer_id
            && match (self.storefront_id, storefront_id) {
                (None, _) => true,
                (Some(own), Some(asked)) => own == asked,
                (Some(_), None) => false,
            }
    }
}

/// Association store port.
pub trait AssociationStore: Send + Sync {
    fn get_active_association(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        storefront_id: Option<StorefrontId>,
    ) -> Option<TenantAssociation>;
}

impl<A> AssociationStore for Arc<A>
where
    A: AssociationStore + ?Sized,
{
    fn get_active_association(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        storefront_id: Option<StorefrontId>,
    ) -> Option<TenantAssociation> {
        (**self).get_active_association(seller_id, buyer_id, storefront_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAssociationStore {
    rows: RwLock<Vec<TenantAssociation>>,
}

impl InMemoryAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, association: TenantAssociation) -> DomainResult<()> {
        if association.seller_id == association.buyer_id {
            return Err(DomainError::validation("a tenant cannot associate with itself"));
        }
        self.rows
            .write()
            .map_err(|_| DomainError::invariant("association lock poisoned"))?
            .push(association);
        Ok(())
    }

    /// Deactivate every association between the pair.
    pub fn revoke(&self, seller_id: TenantId, buyer_id: TenantId) -> DomainResult<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DomainError::invariant("association lock poisoned"))?;
        for row in rows
            .iter_mut()
            .filter(|r| r.seller_id == seller_id && r.buyer_id == buyer_id)
        {
            row.active = false;
        }
        Ok(())
    }
}

impl AssociationStore for InMemoryAssociationStore {
    fn get_active_association(
        &self,
        seller_id: TenantId,
        buyer_id: TenantId,
        storefront_id: Option<StorefrontId>,
    ) -> Option<TenantAssociation> {
        let rows = self.rows.read().ok()?;
        rows.iter()
            .find(|r| r.covers(seller_id, buyer_id, storefront_id))
            .cloned()
    }
}
