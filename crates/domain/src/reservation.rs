//! Reservation planning.
//!
//! Planning validates a cart against a snapshot of the catalog without
//! touching any store. It either yields every line the order needs, each with
//! its unit price frozen, or the first reason the cart cannot be reserved.
//! Applying the plan to stock happens later through atomic conditional
//! decrements, so a plan that passes here can still lose a race.

use std::collections::HashMap;

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartLine;
use crate::catalog::Product;
use crate::value_objects::Money;

/// Reasons a cart cannot be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// The cart has no lines.
    #[error("No order items")]
    EmptyCart,

    /// A line asks for zero units.
    #[error("Invalid quantity for variant {variant_id} (must be greater than 0)")]
    InvalidQuantity { variant_id: VariantId },

    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The referenced variant does not exist in its product.
    #[error("Variant {variant_id} not found in product {product_id}")]
    VariantNotFound {
        product_id: ProductId,
        variant_id: VariantId,
    },

    /// More units were requested than are in stock.
    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_name: String,
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The order total does not fit in the money representation.
    #[error("Order total is too large")]
    TotalOverflow,
}

/// One line of a reservation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl ReservationLine {
    /// Returns quantity times unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The validated result of planning a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPlan {
    lines: Vec<ReservationLine>,
}

impl ReservationPlan {
    /// Returns the planned lines in cart order.
    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    /// Returns the sum of all line totals.
    ///
    /// A plan built by [`plan_reservation`] is known not to overflow.
    pub fn total(&self) -> Money {
        self.lines.iter().map(ReservationLine::line_total).sum()
    }

    /// Returns the total number of units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}

/// Validates `cart` against `products` and freezes unit prices.
///
/// Lines naming the same variant are checked against its stock cumulatively.
pub fn plan_reservation(
    cart: &[CartLine],
    products: &HashMap<ProductId, Product>,
) -> Result<ReservationPlan, ReservationError> {
    if cart.is_empty() {
        return Err(ReservationError::EmptyCart);
    }

    let mut requested: HashMap<(ProductId, VariantId), u32> = HashMap::new();
    let mut lines = Vec::with_capacity(cart.len());
    let mut total = Money::zero();

    for line in cart {
        if line.quantity == 0 {
            return Err(ReservationError::InvalidQuantity {
                variant_id: line.variant_id,
            });
        }

        let product = products
            .get(&line.product_id)
            .ok_or(ReservationError::ProductNotFound(line.product_id))?;
        let variant =
            product
                .variant(line.variant_id)
                .ok_or(ReservationError::VariantNotFound {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                })?;

        let total_requested = requested
            .entry((line.product_id, line.variant_id))
            .or_insert(0);
        *total_requested = total_requested.saturating_add(line.quantity);

        if *total_requested > variant.stock {
            return Err(ReservationError::InsufficientStock {
                product_name: product.name.clone(),
                variant_id: variant.id,
                requested: *total_requested,
                available: variant.stock,
            });
        }

        let unit_price = variant.effective_price();
        total = unit_price
            .checked_multiply(line.quantity)
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or(ReservationError::TotalOverflow)?;

        lines.push(ReservationLine {
            product_id: product.id,
            variant_id: variant.id,
            product_name: product.name.clone(),
            quantity: line.quantity,
            unit_price,
        });
    }

    Ok(ReservationPlan { lines })
}
