use common::{OrderId, ProductId, SagaId, VariantId};
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A product with this id already exists.
    #[error("Product already exists: {0}")]
    DuplicateProduct(ProductId),

    /// The variant does not exist in the product.
    #[error("Variant {variant_id} not found in product {product_id}")]
    VariantNotFound {
        product_id: ProductId,
        variant_id: VariantId,
    },

    /// A conditional stock decrement found fewer units than requested.
    #[error(
        "Insufficient stock for variant {variant_id} of product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A saga log append raced with another writer.
    #[error("Concurrency conflict for saga {saga_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        saga_id: SagaId,
        expected: Version,
        actual: Version,
    },

    /// Records handed to the saga log were malformed.
    #[error("Invalid saga records: {0}")]
    InvalidRecords(String),

    /// A stored row could not be mapped back into the domain model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
