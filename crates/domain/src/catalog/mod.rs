//! Catalog products and their purchasable variants.

mod product;

pub use product::{Product, Variant, VariantAttributes};

use common::{ProductId, VariantId};
use thiserror::Error;

use crate::value_objects::Money;

/// Errors raised when a product or variant fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Product name is empty.
    #[error("Product name is required")]
    NameRequired,

    /// Product has no variants to sell.
    #[error("Product {0} has no variants")]
    NoVariants(ProductId),

    /// Two variants of the same product share an id.
    #[error("Duplicate variant {variant_id} in product {product_id}")]
    DuplicateVariant {
        product_id: ProductId,
        variant_id: VariantId,
    },

    /// Variant price is zero or negative.
    #[error("Invalid price {price} for variant {variant_id} (must be greater than 0)")]
    InvalidPrice { variant_id: VariantId, price: Money },

    /// Variant price exceeds the per-unit ceiling.
    #[error("Price {price} for variant {variant_id} exceeds the maximum of {max}")]
    PriceTooHigh {
        variant_id: VariantId,
        price: Money,
        max: Money,
    },

    /// Sale price is not strictly between zero and the list price.
    #[error(
        "Invalid sale price {sale_price} for variant {variant_id} (must be greater than 0 and less than {price})"
    )]
    InvalidSalePrice {
        variant_id: VariantId,
        price: Money,
        sale_price: Money,
    },
}
