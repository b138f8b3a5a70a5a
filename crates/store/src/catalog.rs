use async_trait::async_trait;
use common::{ProductId, VariantId};
use domain::Product;

use crate::Result;

/// Storage for catalog products.
///
/// Stock is the one field mutated concurrently, so it has dedicated atomic
/// operations instead of going through [`CatalogStore::replace_product`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts a new product.
    ///
    /// Fails with `DuplicateProduct` if the id is taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Replaces an existing product and all of its variants.
    ///
    /// Fails with `ProductNotFound` if the product does not exist.
    async fn replace_product(&self, product: &Product) -> Result<()>;

    /// Retrieves a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves every product among `ids` in one batch.
    ///
    /// Unknown ids are skipped; the caller decides whether that is an error.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Lists all products ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Subtracts `quantity` from a variant's stock if and only if at least
    /// `quantity` units are available, in a single atomic step.
    ///
    /// Returns the remaining stock. Fails with `InsufficientStock` when the
    /// condition does not hold, leaving stock untouched.
    async fn decrement_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32>;

    /// Adds `quantity` back to a variant's stock. Returns the new stock.
    async fn increment_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32>;
}
