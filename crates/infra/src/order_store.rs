//! Order persistence boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use stockgate_core::{OrderId, ProductId};
use stockgate_orders::{Order, OrderStatus};

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("order already exists: {0}")]
    AlreadyExists(OrderId),

    #[error("order not found")]
    NotFound,

    #[error("order storage failure: {0}")]
    Storage(String),
}

/// Filter for listing orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub product_id: Option<ProductId>,
    pub limit: Option<usize>,
}

/// Store for order records.
///
/// Inserts are create-only; `update` replaces the stored record for an
/// existing order (status transitions).
pub trait OrderStore: Send + Sync {
    fn insert(&self, order: Order) -> Result<(), OrderStoreError>;
    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError>;
    fn update(&self, order: Order) -> Result<(), OrderStoreError>;
    fn list(&self, filter: OrderFilter) -> Result<Vec<Order>, OrderStoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
        (**self).insert(order)
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).get(order_id)
    }

    fn update(&self, order: Order) -> Result<(), OrderStoreError> {
        (**self).update(order)
    }

    fn list(&self, filter: OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list(filter)
    }
}

/// In-memory order store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        if orders.contains_key(&order.id()) {
            return Err(OrderStoreError::AlreadyExists(order.id()));
        }
        orders.insert(order.id(), order);
        Ok(())
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;
        Ok(orders.get(&order_id).cloned())
    }

    fn update(&self, order: Order) -> Result<(), OrderStoreError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        if !orders.contains_key(&order.id()) {
            return Err(OrderStoreError::NotFound);
        }
        orders.insert(order.id(), order);
        Ok(())
    }

    fn list(&self, filter: OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status() == s))
            .filter(|o| filter.product_id.is_none_or(|p| o.product_id() == p))
            .cloned()
            .collect();

        // Newest first (UUIDv7 ids are time-ordered).
        matched.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending_order(product_id: ProductId) -> Order {
        Order::new_pending(OrderId::new(), product_id, 1, Utc::now())
    }

    #[test]
    fn insert_then_get() {
        let store = InMemoryOrderStore::new();
        let order = pending_order(ProductId::new());
        store.insert(order.clone()).unwrap();
        assert_eq!(store.get(order.id()).unwrap(), Some(order));
    }

    #[test]
    fn double_insert_is_rejected() {
        let store = InMemoryOrderStore::new();
        let order = pending_order(ProductId::new());
        store.insert(order.clone()).unwrap();
        assert!(matches!(
            store.insert(order),
            Err(OrderStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let order = pending_order(ProductId::new());
        assert!(matches!(store.update(order), Err(OrderStoreError::NotFound)));
    }

    #[test]
    fn list_filters_by_status_and_product() {
        let store = InMemoryOrderStore::new();
        let product_a = ProductId::new();
        let product_b = ProductId::new();

        let pending = pending_order(product_a);
        let paid = pending_order(product_b).pay(Utc::now()).unwrap();
        store.insert(pending.clone()).unwrap();
        store.insert(paid.clone()).unwrap();

        let only_paid = store
            .list(OrderFilter {
                status: Some(OrderStatus::Paid),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(only_paid, vec![paid]);

        let only_a = store
            .list(OrderFilter {
                product_id: Some(product_a),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(only_a, vec![pending]);
    }
}
