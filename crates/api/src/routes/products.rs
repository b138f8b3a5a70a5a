//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ProductId, VariantId};
use domain::{Money, Product, Variant, VariantAttributes};
use serde::{Deserialize, Serialize};
use store::Store;

use super::orders::parse_id;
use crate::auth::Admin;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub variants: Vec<VariantRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRequest {
    /// Kept on replace so existing variant ids stay stable.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: VariantAttributes,
    pub price: f64,
    pub stock: u32,
    #[serde(default)]
    pub on_sale: bool,
    #[serde(default)]
    pub sale_price: Option<f64>,
}

impl ProductRequest {
    /// Builds and validates the product.
    fn into_product(self, id: ProductId) -> Result<Product, ApiError> {
        let variants = self
            .variants
            .into_iter()
            .map(|v| -> Result<Variant, ApiError> {
                let variant_id = match v.id.as_deref() {
                    Some(raw) => parse_id::<VariantId>(raw, "variant")?,
                    None => VariantId::new(),
                };
                Ok(Variant {
                    id: variant_id,
                    attributes: v.attributes,
                    price: Money::from_major(v.price)?,
                    stock: v.stock,
                    on_sale: v.on_sale,
                    sale_price: v.sale_price.map(Money::from_major).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        let product = Product {
            id,
            name: self.name.trim().to_string(),
            category: self.category.trim().to_string(),
            subcategory: self.subcategory,
            variants,
        };
        product.validate()?;
        Ok(product)
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub variants: Vec<VariantResponse>,
    pub total_stock: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResponse {
    pub id: VariantId,
    pub attributes: VariantAttributes,
    pub price: f64,
    pub on_sale: bool,
    pub sale_price: Option<f64>,
    /// What a buyer pays per unit right now.
    pub effective_price: f64,
    pub stock: u32,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            category: product.category.clone(),
            subcategory: product.subcategory.clone(),
            variants: product
                .variants
                .iter()
                .map(|v| VariantResponse {
                    id: v.id,
                    attributes: v.attributes.clone(),
                    price: v.price.as_major(),
                    on_sale: v.on_sale,
                    sale_price: v.sale_price.map(|p| p.as_major()),
                    effective_price: v.effective_price().as_major(),
                    stock: v.stock,
                })
                .collect(),
            total_stock: product.total_stock(),
        }
    }
}

// -- Handlers --

/// POST /products
#[tracing::instrument(skip(state, _admin, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let Json(req) = payload?;
    let product = req.into_product(ProductId::new())?;
    state.store().insert_product(&product).await?;
    tracing::info!(product_id = %product.id, variants = product.variants.len(), "product created");
    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// PUT /products/{id}: replaces the product, variants and stock included.
#[tracing::instrument(skip(state, _admin, payload))]
pub async fn replace<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<String>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let Json(req) = payload?;
    let product = req.into_product(parse_id(&id, "product")?)?;
    state.store().replace_product(&product).await?;
    tracing::info!(product_id = %product.id, "product replaced");
    Ok(Json(ProductResponse::from(&product)))
}

/// GET /products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.store().list_products().await?;
    Ok(Json(products.iter().map(ProductResponse::from).collect()))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .store()
        .get_product(parse_id(&id, "product")?)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;
    Ok(Json(ProductResponse::from(&product)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(price: f64, sale_price: Option<f64>) -> ProductRequest {
        ProductRequest {
            name: " Phone ".to_string(),
            category: "Electronics".to_string(),
            subcategory: None,
            variants: vec![VariantRequest {
                id: None,
                attributes: VariantAttributes {
                    color: Some("black".to_string()),
                    ..VariantAttributes::default()
                },
                price,
                stock: 4,
                on_sale: sale_price.is_some(),
                sale_price,
            }],
        }
    }

    #[test]
    fn test_into_product_converts_prices() {
        let product = request(199.99, Some(149.5))
            .into_product(ProductId::new())
            .unwrap();
        assert_eq!(product.name, "Phone");
        assert_eq!(product.variants[0].price, Money::from_cents(19999));
        assert_eq!(product.variants[0].effective_price(), Money::from_cents(14950));
    }

    #[test]
    fn test_into_product_rejects_sale_above_price() {
        let result = request(10.0, Some(12.0)).into_product(ProductId::new());
        assert!(matches!(result, Err(ApiError::Domain(_))));
    }

    #[test]
    fn test_into_product_rejects_unrepresentable_price() {
        let result = request(1.0e17, None).into_product(ProductId::new());
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let result = request(1.0e12, None).into_product(ProductId::new());
        assert!(matches!(result, Err(ApiError::Domain(_))));
    }

    #[test]
    fn test_into_product_keeps_variant_ids() {
        let variant_id = VariantId::new();
        let mut req = request(10.0, None);
        req.variants[0].id = Some(variant_id.to_string());
        let product = req.into_product(ProductId::new()).unwrap();
        assert_eq!(product.variants[0].id, variant_id);
    }
}
