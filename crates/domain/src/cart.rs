//! Cart lines submitted at checkout.

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

/// One line of a submitted cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl CartLine {
    /// Creates a cart line.
    pub fn new(product_id: ProductId, variant_id: VariantId, quantity: u32) -> Self {
        Self {
            product_id,
            variant_id,
            quantity,
        }
    }
}
