//! Order placement and order management endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SagaId, VariantId};
use domain::{CartLine, Money, Order, PaymentMethod, PaymentResult, ShippingAddress};
use saga::PlaceOrder;
use serde::{Deserialize, Serialize};
use store::{OrderQuery, Store};

use crate::auth::{self, Admin, Caller};
use crate::error::ApiError;
use crate::state::AppState;

/// Optional client-chosen request id. Resubmitting the same id is rejected.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub order_items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub payment_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product: String,
    pub variant: String,
    pub quantity: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub unseen: Option<bool>,
    pub paid: Option<bool>,
    pub delivered: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListOrdersParams> for OrderQuery {
    fn from(params: ListOrdersParams) -> Self {
        OrderQuery {
            is_seen: params.unseen.map(|unseen| !unseen),
            is_paid: params.paid,
            is_delivered: params.delivered,
            limit: params.limit,
            offset: params.offset,
            ..OrderQuery::default()
        }
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    /// Owner label: the user's name or email, or `Guest (<phone>)`.
    pub user: String,
    pub guest: bool,
    pub order_items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub total_price: f64,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResultResponse>,
    pub is_seen: bool,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product: ProductId,
    pub variant: VariantId,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    pub line_total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResultResponse {
    pub id: String,
    pub status: String,
    pub update_time: DateTime<Utc>,
}

impl From<&PaymentResult> for PaymentResultResponse {
    fn from(result: &PaymentResult) -> Self {
        Self {
            id: result.id.clone(),
            status: result.status.clone(),
            update_time: result.update_time,
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user: order.owner.display_name(),
            guest: order.owner.is_guest(),
            order_items: order
                .lines
                .iter()
                .map(|line| OrderItemResponse {
                    product: line.product_id,
                    variant: line.variant_id,
                    name: line.product_name.clone(),
                    quantity: line.quantity,
                    price: line.unit_price.as_major(),
                    line_total: line.line_total().as_major(),
                })
                .collect(),
            shipping_address: order.shipping_address.clone(),
            payment_method: order.payment_method,
            total_price: order.total_price.as_major(),
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            payment_result: order.payment_result.as_ref().map(PaymentResultResponse::from),
            is_seen: order.is_seen,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
        }
    }
}

// -- Handlers --

/// POST /orders: run the placement saga for the caller's cart.
#[tracing::instrument(skip(state, caller, headers, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    headers: HeaderMap,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = payload?;
    let cmd = place_order_command(&caller, &headers, req)?;
    let order = state.saga.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: admin listing, newest first.
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.store().query_orders(params.into()).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/mine: the caller's own orders.
#[tracing::instrument(skip(state, caller))]
pub async fn mine<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.store().query_orders(caller.orders_query()).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: readable by admins and by whoever placed the order.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_order(&state, &id).await?;

    if auth::check_admin(&headers, &state).is_err() {
        let caller = auth::resolve_caller(&headers, &state)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Not authorized".to_string()))?;
        if !caller.owns(&order) {
            return Err(ApiError::Forbidden(
                "Order belongs to another customer".to_string(),
            ));
        }
    }

    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/pay: record payment collected outside the saga.
#[tracing::instrument(skip(state, _admin))]
pub async fn pay<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut order = load_order(&state, &id).await?;
    order.mark_paid(None)?;
    state.store().update_order_flags(&order).await?;
    tracing::info!(order_id = %order.id, "order marked paid");
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/deliver
#[tracing::instrument(skip(state, _admin))]
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut order = load_order(&state, &id).await?;
    order.mark_delivered()?;
    state.store().update_order_flags(&order).await?;
    tracing::info!(order_id = %order.id, "order marked delivered");
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/seen
#[tracing::instrument(skip(state, _admin))]
pub async fn seen<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut order = load_order(&state, &id).await?;
    if !order.is_seen {
        order.mark_seen();
        state.store().update_order_flags(&order).await?;
    }
    Ok(Json(OrderResponse::from(&order)))
}

fn place_order_command(
    caller: &Caller,
    headers: &HeaderMap,
    req: PlaceOrderRequest,
) -> Result<PlaceOrder, ApiError> {
    let payment_method: PaymentMethod = req
        .payment_method
        .parse()
        .map_err(|e: domain::UnknownPaymentMethod| ApiError::BadRequest(e.to_string()))?;

    let lines = req
        .order_items
        .iter()
        .map(|item| {
            Ok(CartLine::new(
                parse_id::<ProductId>(&item.product, "product")?,
                parse_id::<VariantId>(&item.variant, "variant")?,
                item.quantity,
            ))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut cmd = PlaceOrder::new(caller.owner(), lines, req.shipping_address, payment_method);
    if let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        cmd = cmd.with_saga_id(parse_id::<SagaId>(request_id, "request")?);
    }
    if let Some(total) = req.total_price {
        cmd = cmd.with_declared_total(Money::from_major(total)?);
    }
    if let Some(token) = req.payment_token {
        cmd = cmd.with_payment_token(token);
    }
    Ok(cmd)
}

async fn load_order<S: Store>(state: &AppState<S>, id: &str) -> Result<Order, ApiError> {
    let order_id = parse_id::<OrderId>(id, "order")?;
    state
        .store()
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

pub(crate) fn parse_id<T: From<uuid::Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    uuid::Uuid::parse_str(raw.trim())
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_map_to_query() {
        let query = OrderQuery::from(ListOrdersParams {
            unseen: Some(true),
            paid: Some(false),
            limit: Some(10),
            ..ListOrdersParams::default()
        });
        assert_eq!(query.is_seen, Some(false));
        assert_eq!(query.is_paid, Some(false));
        assert_eq!(query.is_delivered, None);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.user_id, None);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id::<OrderId>("nope", "order").is_err());
        let id = OrderId::new();
        assert_eq!(parse_id::<OrderId>(&id.to_string(), "order").unwrap(), id);
    }
}
