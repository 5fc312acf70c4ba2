//! In-memory order store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{OrderStore, StoreError};
use crate::domain::{PendingOrder, TenantId};

/// In-memory implementation of `OrderStore`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<(TenantId, String), PendingOrder>>,
}

impl InMemoryOrderStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored orders across all tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// All stored orders for one tenant.
    #[must_use]
    pub fn orders_for(&self, tenant: &TenantId) -> Vec<PendingOrder> {
        self.orders
            .read()
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, order)| order.clone())
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert_order(&self, order: &PendingOrder) -> Result<(), StoreError> {
        let mut orders = self.orders.write();
        let key = (order.tenant.clone(), order.order_id.clone());
        let mut record = order.clone();
        // Reconciliation upserts carry no order-set id; keep the one the
        // original placement recorded.
        if record.order_set_id.is_none() {
            if let Some(existing) = orders.get(&key) {
                record.order_set_id = existing.order_set_id;
            }
        }
        orders.insert(key, record);
        Ok(())
    }

    async fn delete_user(&self, _tenant: &TenantId) -> Result<(), StoreError> {
        // Tenant records live only in the registry map for this store;
        // nothing durable to remove.
        Ok(())
    }

    async fn delete_orders(&self, tenant: &TenantId) -> Result<(), StoreError> {
        self.orders.write().retain(|(t, _), _| t != tenant);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, OrderStatus};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn order(tenant: &str, order_id: &str, set_id: Option<Uuid>) -> PendingOrder {
        PendingOrder {
            tenant: TenantId::new(tenant),
            order_id: order_id.to_string(),
            order_set_id: set_id,
            symbol: "XBTUSD".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::ONE,
            price: None,
            status: OrderStatus::New,
            last_timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_preserves_order_set_id_when_incoming_has_none() {
        let store = InMemoryOrderStore::new();
        let set_id = Uuid::new_v4();
        let tenant = TenantId::new("alice");

        store
            .upsert_order(&order("alice", "o-1", Some(set_id)))
            .await
            .unwrap();
        store.upsert_order(&order("alice", "o-1", None)).await.unwrap();

        let orders = store.orders_for(&tenant);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_set_id, Some(set_id));
    }

    #[tokio::test]
    async fn delete_orders_only_touches_the_named_tenant() {
        let store = InMemoryOrderStore::new();
        store.upsert_order(&order("alice", "o-1", None)).await.unwrap();
        store.upsert_order(&order("bob", "o-2", None)).await.unwrap();

        store.delete_orders(&TenantId::new("alice")).await.unwrap();

        assert!(store.orders_for(&TenantId::new("alice")).is_empty());
        assert_eq!(store.orders_for(&TenantId::new("bob")).len(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_order_id() {
        let store = InMemoryOrderStore::new();
        let mut first = order("alice", "o-1", None);
        first.status = OrderStatus::New;
        store.upsert_order(&first).await.unwrap();

        let mut second = order("alice", "o-1", None);
        second.status = OrderStatus::Filled;
        store.upsert_order(&second).await.unwrap();

        let orders = store.orders_for(&TenantId::new("alice"));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Filled);
    }
}
