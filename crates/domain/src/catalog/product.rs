use std::collections::HashSet;

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::CatalogError;
use crate::value_objects::Money;

/// Optional descriptive attributes of a variant.
///
/// Products use whichever subset applies: a phone has color and storage, a
/// shirt has color and size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// A purchasable configuration of a product with its own price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    #[serde(default)]
    pub attributes: VariantAttributes,
    pub price: Money,
    pub stock: u32,
    #[serde(default)]
    pub on_sale: bool,
    #[serde(default)]
    pub sale_price: Option<Money>,
}

impl Variant {
    /// Creates a variant at list price with the given stock.
    pub fn new(price: Money, stock: u32) -> Self {
        Self {
            id: VariantId::new(),
            attributes: VariantAttributes::default(),
            price,
            stock,
            on_sale: false,
            sale_price: None,
        }
    }

    /// Sets the descriptive attributes.
    pub fn with_attributes(mut self, attributes: VariantAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Puts the variant on sale at the given price.
    pub fn on_sale_at(mut self, sale_price: Money) -> Self {
        self.on_sale = true;
        self.sale_price = Some(sale_price);
        self
    }

    /// Returns the price a buyer pays for one unit right now.
    ///
    /// The sale price applies only while the variant is on sale and the sale
    /// price is positive; otherwise the list price applies.
    pub fn effective_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if self.on_sale && sale.is_positive() => sale,
            _ => self.price,
        }
    }

    /// Checks price invariants.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if !self.price.is_positive() {
            return Err(CatalogError::InvalidPrice {
                variant_id: self.id,
                price: self.price,
            });
        }
        if self.price > Money::MAX_UNIT_PRICE {
            return Err(CatalogError::PriceTooHigh {
                variant_id: self.id,
                price: self.price,
                max: Money::MAX_UNIT_PRICE,
            });
        }
        if self.on_sale
            && let Some(sale_price) = self.sale_price
            && (!sale_price.is_positive() || sale_price >= self.price)
        {
            return Err(CatalogError::InvalidSalePrice {
                variant_id: self.id,
                price: self.price,
                sale_price,
            });
        }
        Ok(())
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub variants: Vec<Variant>,
}

impl Product {
    /// Creates a product with a fresh id.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            category: category.into(),
            subcategory: None,
            variants,
        }
    }

    /// Looks up a variant by id.
    pub fn variant(&self, variant_id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Looks up a variant by id for mutation.
    pub fn variant_mut(&mut self, variant_id: VariantId) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == variant_id)
    }

    /// Total units in stock across all variants.
    pub fn total_stock(&self) -> u64 {
        self.variants.iter().map(|v| u64::from(v.stock)).sum()
    }

    /// Checks the product and every variant.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::NameRequired);
        }
        if self.variants.is_empty() {
            return Err(CatalogError::NoVariants(self.id));
        }

        let mut seen = HashSet::with_capacity(self.variants.len());
        for variant in &self.variants {
            if !seen.insert(variant.id) {
                return Err(CatalogError::DuplicateVariant {
                    product_id: self.id,
                    variant_id: variant.id,
                });
            }
            variant.validate()?;
        }
        Ok(())
    }
}
