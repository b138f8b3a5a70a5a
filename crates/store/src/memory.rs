use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{OrderId, ProductId, SagaId, VariantId};
use domain::{Order, Product};
use tokio::sync::RwLock;

use crate::saga_log::validate_records_for_append;
use crate::{
    CatalogStore, OrderQuery, OrderStore, Result, SagaLog, SagaRecord, StoreError, Version,
};

#[derive(Debug, Default)]
struct FailureSwitches {
    order_insert: AtomicBool,
    stock_increment: AtomicBool,
    /// Event type whose next append fails. Cleared once it fires.
    record_append: Mutex<Option<String>>,
}

impl FailureSwitches {
    fn take_record_failure(&self, records: &[SagaRecord]) -> bool {
        let Ok(mut armed) = self.record_append.lock() else {
            return false;
        };
        let hit = armed
            .as_deref()
            .is_some_and(|event_type| records.iter().any(|r| r.event_type == event_type));
        if hit {
            *armed = None;
        }
        hit
    }
}

/// In-memory store implementation for testing and local development.
///
/// Provides the same interface and the same stock guarantees as the
/// PostgreSQL implementation: a conditional decrement checks and subtracts
/// under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    saga_records: Arc<RwLock<HashMap<SagaId, Vec<SagaRecord>>>>,
    failures: Arc<FailureSwitches>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every order insert fail as if the database were down.
    pub fn set_fail_on_order_insert(&self, fail: bool) {
        self.failures.order_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes every stock increment fail as if the database were down.
    pub fn set_fail_on_stock_increment(&self, fail: bool) {
        self.failures.stock_increment.store(fail, Ordering::SeqCst);
    }

    /// Makes the next saga log append containing `event_type` fail as if the
    /// database were down.
    pub fn fail_next_record_append(&self, event_type: &str) {
        if let Ok(mut armed) = self.failures.record_append.lock() {
            *armed = Some(event_type.to_string());
        }
    }

    /// Returns the stock of a variant, if it exists.
    pub async fn stock_of(&self, product_id: ProductId, variant_id: VariantId) -> Option<u32> {
        self.products
            .read()
            .await
            .get(&product_id)
            .and_then(|p| p.variant(variant_id))
            .map(|v| v.stock)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(StoreError::DuplicateProduct(product.id));
        }
        products.insert(product.id, product.clone());
        Ok(())
    }

    async fn replace_product(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        let slot = products
            .get_mut(&product.id)
            .ok_or(StoreError::ProductNotFound(product.id))?;
        *slot = product.clone();
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut found: Vec<Product> = ids.iter().filter_map(|id| products.get(id)).cloned().collect();
        found.sort_by_key(|p| p.id);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32> {
        let mut products = self.products.write().await;
        let variant = products
            .get_mut(&product_id)
            .and_then(|p| p.variant_mut(variant_id))
            .ok_or(StoreError::VariantNotFound {
                product_id,
                variant_id,
            })?;

        if variant.stock < quantity {
            metrics::counter!("stock_decrement_rejected_total").increment(1);
            return Err(StoreError::InsufficientStock {
                product_id,
                variant_id,
                requested: quantity,
                available: variant.stock,
            });
        }

        variant.stock -= quantity;
        Ok(variant.stock)
    }

    async fn increment_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32> {
        if self.failures.stock_increment.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("stock increment disabled".into()));
        }

        let mut products = self.products.write().await;
        let variant = products
            .get_mut(&product_id)
            .and_then(|p| p.variant_mut(variant_id))
            .ok_or(StoreError::VariantNotFound {
                product_id,
                variant_id,
            })?;

        variant.stock = variant.stock.saturating_add(quantity);
        Ok(variant.stock)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        if self.failures.order_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order insert disabled".into()));
        }
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_order_flags(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;

        stored.is_paid = order.is_paid;
        stored.paid_at = order.paid_at;
        stored.payment_result = order.payment_result.clone();
        stored.is_seen = order.is_seen;
        stored.is_delivered = order.is_delivered;
        stored.delivered_at = order.delivered_at;
        Ok(())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl SagaLog for InMemoryStore {
    async fn append_records(
        &self,
        records: Vec<SagaRecord>,
        expected_version: Version,
    ) -> Result<Version> {
        let saga_id = validate_records_for_append(&records, expected_version)?;
        if self.failures.take_record_failure(&records) {
            return Err(StoreError::Unavailable("saga log append disabled".into()));
        }

        let mut log = self.saga_records.write().await;
        let stream = log.entry(saga_id).or_default();

        let current_version = stream
            .last()
            .map(|r| r.version)
            .unwrap_or(Version::initial());
        if current_version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                saga_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let last_version = records
            .last()
            .map(|r| r.version)
            .unwrap_or(current_version);
        stream.extend(records);
        Ok(last_version)
    }

    async fn load_records(&self, saga_id: SagaId) -> Result<Vec<SagaRecord>> {
        Ok(self
            .saga_records
            .read()
            .await
            .get(&saga_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{GuestIdentity, Money, OrderOwner, Variant};

    fn product(stock: u32) -> Product {
        Product::new(
            "Widget",
            "Gadgets",
            vec![Variant::new(Money::from_cents(1000), stock)],
        )
    }

    #[tokio::test]
    async fn test_insert_and_get_product() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        assert_eq!(store.get_product(p.id).await.unwrap(), Some(p.clone()));
        assert!(matches!(
            store.insert_product(&p).await,
            Err(StoreError::DuplicateProduct(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_missing_product_fails() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.replace_product(&product(1)).await,
            Err(StoreError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_products_skips_unknown_and_duplicates() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        let found = store
            .get_products(&[p.id, ProductId::new(), p.id])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let store = InMemoryStore::new();
        let p = product(5);
        let vid = p.variants[0].id;
        store.insert_product(&p).await.unwrap();

        assert_eq!(store.decrement_stock(p.id, vid, 3).await.unwrap(), 2);
        let err = store.decrement_stock(p.id, vid, 3).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.stock_of(p.id, vid).await, Some(2));
    }

    #[tokio::test]
    async fn test_decrement_unknown_variant() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        assert!(matches!(
            store.decrement_stock(p.id, VariantId::new(), 1).await,
            Err(StoreError::VariantNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_oversell() {
        let store = InMemoryStore::new();
        let p = product(10);
        let vid = p.variants[0].id;
        store.insert_product(&p).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            let pid = p.id;
            handles.push(tokio::spawn(async move {
                store.decrement_stock(pid, vid, 1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(store.stock_of(p.id, vid).await, Some(0));
    }

    #[tokio::test]
    async fn test_increment_failure_switch() {
        let store = InMemoryStore::new();
        let p = product(1);
        let vid = p.variants[0].id;
        store.insert_product(&p).await.unwrap();

        store.set_fail_on_stock_increment(true);
        assert!(matches!(
            store.increment_stock(p.id, vid, 1).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_fail_on_stock_increment(false);
        assert_eq!(store.increment_stock(p.id, vid, 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_append_failure_fires_once() {
        let store = InMemoryStore::new();
        let saga_id = SagaId::new();
        let record = SagaRecord::new(saga_id, Version::new(1), "A", serde_json::json!({}));
        store.fail_next_record_append("A");

        assert!(matches!(
            store
                .append_records(vec![record.clone()], Version::initial())
                .await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.load_records(saga_id).await.unwrap().is_empty());

        store
            .append_records(vec![record], Version::initial())
            .await
            .unwrap();
        assert_eq!(store.load_records(saga_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_saga_log_enforces_expected_version() {
        let store = InMemoryStore::new();
        let saga_id = SagaId::new();
        let first = SagaRecord::new(saga_id, Version::new(1), "A", serde_json::json!({}));

        let v = store
            .append_records(vec![first.clone()], Version::initial())
            .await
            .unwrap();
        assert_eq!(v, Version::new(1));

        let conflict = store
            .append_records(vec![first], Version::initial())
            .await;
        assert!(conflict.is_err());

        assert_eq!(store.load_records(saga_id).await.unwrap().len(), 1);
        assert!(store.load_records(SagaId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_order_flags_requires_existing_order() {
        let store = InMemoryStore::new();
        let p = product(5);
        let cart = [domain::CartLine::new(p.id, p.variants[0].id, 1)];
        let catalog: HashMap<_, _> = [(p.id, p.clone())].into_iter().collect();
        let plan = domain::plan_reservation(&cart, &catalog).unwrap();
        let mut order = Order::place(
            OrderOwner::Guest(GuestIdentity {
                phone: "+15550100".into(),
            }),
            &plan,
            domain::ShippingAddress {
                address: "1 Main St".into(),
                city: "Springfield".into(),
                postal_code: "12345".into(),
                country: "US".into(),
            },
            domain::PaymentMethod::Cash,
            None,
        );

        assert!(matches!(
            store.update_order_flags(&order).await,
            Err(StoreError::OrderNotFound(_))
        ));

        store.insert_order(&order).await.unwrap();
        order.mark_seen();
        store.update_order_flags(&order).await.unwrap();
        assert!(store.get_order(order.id).await.unwrap().unwrap().is_seen);
        assert_eq!(
            store.query_orders(OrderQuery::unseen()).await.unwrap().len(),
            0
        );
        assert_eq!(
            store
                .query_orders(OrderQuery::for_guest("+15550100"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            store
                .query_orders(OrderQuery::for_guest("+15550199"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
