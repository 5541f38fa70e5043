use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use tradedesk_core::TenantId;

/// Tenant-partitioned key/value store for disposable read models.
///
/// Reads are scoped to one tenant. The two cross-tenant operations exist for
/// owner resolution (an id arrives without its owning seller) and for
/// background scans; neither is reachable from a tenant-facing query.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop every record of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);

    /// Locate a key in whichever tenant partition holds it.
    fn find(&self, key: &K) -> Option<(TenantId, V)>;
    /// Every record matching `pred`, across tenants.
    fn scan(&self, pred: &dyn Fn(&V) -> bool) -> Vec<(TenantId, V)>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }

    fn find(&self, key: &K) -> Option<(TenantId, V)> {
        (**self).find(key)
    }

    fn scan(&self, pred: &dyn Fn(&V) -> bool) -> Vec<(TenantId, V)> {
        (**self).scan(pred)
    }
}

/// In-memory tenant-partitioned store.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    partitions: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.partitions.read().ok()?;
        map.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.partitions.write() {
            map.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        match self.partitions.read() {
            Ok(map) => map
                .get(&tenant_id)
                .map(|p| p.values().cloned().collect())
                .unwrap_or_default(),
            Err(_) => vec![],
        }
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.partitions.write() {
            map.remove(&tenant_id);
        }
    }

    fn find(&self, key: &K) -> Option<(TenantId, V)> {
        let map = self.partitions.read().ok()?;
        map.iter()
            .find_map(|(tenant, p)| p.get(key).map(|v| (*tenant, v.clone())))
    }

    fn scan(&self, pred: &dyn Fn(&V) -> bool) -> Vec<(TenantId, V)> {
        let Ok(map) = self.partitions.read() else {
            return vec![];
        };
        map.iter()
            .flat_map(|(tenant, p)| {
                p.values()
                    .filter(|v| pred(v))
                    .map(move |v| (*tenant, v.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_never_see_each_others_rows() {
        let store = InMemoryTenantStore::<u32, &'static str>::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store.upsert(a, 1, "a-one");
        store.upsert(b, 1, "b-one");

        assert_eq!(store.get(a, &1), Some("a-one"));
        assert_eq!(store.list(b), vec!["b-one"]);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some("b-one"));
    }

    #[test]
    fn find_and_scan_cross_partitions() {
        let store = InMemoryTenantStore::<u32, u32>::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store.upsert(a, 1, 10);
        store.upsert(b, 2, 20);

        assert_eq!(store.find(&2), Some((b, 20)));
        assert_eq!(store.find(&3), None);

        let big = store.scan(&|v| *v > 15);
        assert_eq!(big, vec![(b, 20)]);
    }
}
