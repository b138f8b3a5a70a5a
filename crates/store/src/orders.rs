use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::{OrderQuery, Result};

/// Storage for placed orders. Orders are never deleted.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a newly placed order.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Retrieves an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Writes back the paid, seen and delivered flags of an existing order.
    ///
    /// Lines and prices are immutable after placement and are not rewritten.
    async fn update_order_flags(&self, order: &Order) -> Result<()>;

    /// Retrieves orders matching a query, newest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;
}
