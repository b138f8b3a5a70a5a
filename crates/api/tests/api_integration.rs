//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use domain::{Money, Product, Variant};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::InMemoryGuestVerifier;
use serde_json::{Value, json};
use store::{CatalogStore, InMemoryStore, Store};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";
const OTP_CODE: &str = "424242";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let config = Config {
        admin_api_key: Some(ADMIN_KEY.to_string()),
        ..Config::default()
    };
    let verifier = Arc::new(InMemoryGuestVerifier::with_fixed_code(OTP_CODE));
    let state = api::create_state(InMemoryStore::new(), verifier, &config);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> axum::Router {
    setup_with_state().0
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn json_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
}

fn with_body(builder: axum::http::request::Builder, body: &Value) -> Request<Body> {
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    with_body(
        json_request("POST", uri).header("x-admin-key", ADMIN_KEY),
        &body,
    )
}

fn admin_put(uri: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap()
}

fn user_get(uri: &str, user_id: UserId) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

fn phone_product() -> Value {
    json!({
        "name": "Phone",
        "category": "Electronics",
        "variants": [
            { "attributes": { "color": "black" }, "price": 100.0, "stock": 5 },
            { "attributes": { "color": "white" }, "price": 120.0, "stock": 1,
              "onSale": true, "salePrice": 90.0 }
        ]
    })
}

/// Creates the phone product and returns (product id, [variant ids]).
async fn create_phone(app: &axum::Router) -> (String, Vec<String>) {
    let (status, json) = send(app, admin_post("/products", phone_product())).await;
    assert_eq!(status, StatusCode::CREATED);
    let variants = json["variants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect();
    (json["id"].as_str().unwrap().to_string(), variants)
}

fn order_body(product: &str, variant: &str, quantity: u32, payment_method: &str) -> Value {
    json!({
        "orderItems": [{ "product": product, "variant": variant, "quantity": quantity }],
        "shippingAddress": {
            "address": "1 Main St",
            "city": "Springfield",
            "postalCode": "12345",
            "country": "US"
        },
        "paymentMethod": payment_method,
        "totalPrice": 100.0 * f64::from(quantity)
    })
}

fn user_order(user_id: UserId, body: Value) -> Request<Body> {
    with_body(
        json_request("POST", "/orders")
            .header("x-user-id", user_id.to_string())
            .header("x-user-email", "ada@example.com"),
        &body,
    )
}

async fn variant_stock(app: &axum::Router, product: &str, index: usize) -> u64 {
    let (status, json) = send(
        app,
        Request::builder()
            .uri(format!("/products/{product}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["variants"][index]["stock"].as_u64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_product_admin_routes_require_key() {
    let app = setup();

    let body = phone_product();
    let (status, json) = send(&app, with_body(json_request("POST", "/products"), &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["message"].is_string());

    let (status, _) = send(
        &app,
        with_body(
            json_request("POST", "/products").header("x-admin-key", "wrong"),
            &body,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_and_get_product() {
    let app = setup();
    let (product_id, variants) = create_phone(&app).await;
    assert_eq!(variants.len(), 2);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Phone");
    assert_eq!(json["totalStock"], 6);
    assert_eq!(json["variants"][1]["effectivePrice"], 90.0);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/products")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_product_is_rejected() {
    let app = setup();
    let body = json!({
        "name": "Phone",
        "category": "Electronics",
        "variants": [{ "price": 0.0, "stock": 1 }]
    });

    let (status, json) = send(&app, admin_post("/products", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("price"));
}

#[tokio::test]
async fn test_out_of_range_price_is_rejected() {
    let app = setup();
    for price in [1.0e17, 1.0e12] {
        let body = json!({
            "name": "Yacht",
            "category": "Boats",
            "variants": [{ "price": price, "stock": 5 }]
        });
        let (status, json) = send(&app, admin_post("/products", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "price {price}");
        assert!(json["message"].is_string());
    }
}

#[tokio::test]
async fn test_get_nonexistent_product() {
    let app = setup();
    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{}", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_place_cash_order() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let user_id = UserId::new();

    let (status, json) = send(
        &app,
        user_order(user_id, order_body(&product, &variants[0], 2, "cash")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["isPaid"], false);
    assert_eq!(json["isSeen"], false);
    assert_eq!(json["totalPrice"], 200.0);
    assert_eq!(json["paymentMethod"], "cash");
    assert_eq!(json["user"], "ada@example.com");
    assert_eq!(json["orderItems"][0]["quantity"], 2);
    assert_eq!(variant_stock(&app, &product, 0).await, 3);

    let order_id = json["id"].as_str().unwrap();
    let (status, json) = send(&app, user_get(&format!("/orders/{order_id}"), user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], order_id);

    let (status, _) = send(&app, user_get(&format!("/orders/{order_id}"), UserId::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_place_card_order_charges_sale_price() {
    let (app, state) = setup_with_state();
    let (product, variants) = create_phone(&app).await;

    let mut body = order_body(&product, &variants[1], 1, "credit-card");
    body["paymentToken"] = json!("tok_visa");
    let (status, json) = send(&app, user_order(UserId::new(), body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["isPaid"], true);
    assert_eq!(json["totalPrice"], 90.0);
    let charge_id = json["paymentResult"]["id"].as_str().unwrap();
    let charge = state.saga.payment().charge(charge_id).unwrap();
    assert_eq!(charge.amount_minor, 9000);
    assert_eq!(charge.source, "tok_visa");
}

#[tokio::test]
async fn test_order_without_identity_is_unauthorized() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let body = order_body(&product, &variants[0], 1, "cash");

    let (status, _) = send(&app, with_body(json_request("POST", "/orders"), &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(variant_stock(&app, &product, 0).await, 5);
}

#[tokio::test]
async fn test_card_order_without_token_is_rejected() {
    let (app, state) = setup_with_state();
    let (product, variants) = create_phone(&app).await;

    let (status, json) = send(
        &app,
        user_order(
            UserId::new(),
            order_body(&product, &variants[0], 1, "credit-card"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].is_string());
    assert_eq!(state.saga.payment().attempt_count(), 0);
    assert_eq!(variant_stock(&app, &product, 0).await, 5);
}

#[tokio::test]
async fn test_insufficient_stock_is_rejected() {
    let (app, state) = setup_with_state();
    let (product, variants) = create_phone(&app).await;

    let (status, json) = send(
        &app,
        user_order(UserId::new(), order_body(&product, &variants[1], 2, "cash")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("stock"));
    assert_eq!(variant_stock(&app, &product, 1).await, 1);
    assert_eq!(state.store().order_count().await, 0);
}

#[tokio::test]
async fn test_declined_payment_restores_stock() {
    let (app, state) = setup_with_state();
    let (product, variants) = create_phone(&app).await;
    state.saga.payment().set_fail_on_charge(true);

    let mut body = order_body(&product, &variants[0], 3, "credit-card");
    body["paymentToken"] = json!("tok_declined");
    let (status, _) = send(&app, user_order(UserId::new(), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(variant_stock(&app, &product, 0).await, 5);
    assert_eq!(state.store().order_count().await, 0);
}

#[tokio::test]
async fn test_overflowing_order_total_is_rejected() {
    let (app, state) = setup_with_state();
    let product = Product::new(
        "Yacht",
        "Boats",
        vec![Variant::new(Money::from_cents(i64::MAX / 2 + 1), 5)],
    );
    state.store().insert_product(&product).await.unwrap();

    let mut body = order_body(
        &product.id.to_string(),
        &product.variants[0].id.to_string(),
        2,
        "cash",
    );
    body.as_object_mut().unwrap().remove("totalPrice");
    let (status, json) = send(&app, user_order(UserId::new(), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("too large"));
    assert_eq!(variant_stock(&app, &product.id.to_string(), 0).await, 5);
    assert_eq!(state.store().order_count().await, 0);
}

#[tokio::test]
async fn test_malformed_order_body_is_bad_request() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let mut body = order_body(&product, &variants[0], 1, "cash");
    body["orderItems"][0]["quantity"] = json!(-1);

    let (status, json) = send(&app, user_order(UserId::new(), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("quantity"));
    assert_eq!(variant_stock(&app, &product, 0).await, 5);

    let request = json_request("POST", "/products")
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_unknown_payment_method_is_rejected() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;

    let (status, _) = send(
        &app,
        user_order(UserId::new(), order_body(&product, &variants[0], 1, "barter")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_request_id_is_rejected() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let user_id = UserId::new();
    let request_id = uuid::Uuid::new_v4().to_string();

    let request = |body: Value| {
        with_body(
            json_request("POST", "/orders")
                .header("x-user-id", user_id.to_string())
                .header("x-request-id", request_id.clone()),
            &body,
        )
    };

    let (first, _) = send(&app, request(order_body(&product, &variants[0], 1, "cash"))).await;
    let (second, _) = send(&app, request(order_body(&product, &variants[0], 1, "cash"))).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(variant_stock(&app, &product, 0).await, 4);
}

#[tokio::test]
async fn test_guest_checkout_flow() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;

    let otp = json!({ "phone": "+15550100" });
    let (status, json) = send(&app, with_body(json_request("POST", "/guest/otp"), &otp)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["attemptId"].as_str().unwrap().starts_with("VE"));

    let verify = json!({ "phone": "+15550100", "code": OTP_CODE });
    let (status, json) = send(
        &app,
        with_body(json_request("POST", "/guest/verify"), &verify),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = json["token"].as_str().unwrap().to_string();
    assert!(json["expiresAt"].is_string());

    let body = order_body(&product, &variants[0], 1, "cash");
    let (status, json) = send(
        &app,
        with_body(
            json_request("POST", "/orders")
                .header("authorization", format!("Bearer {token}")),
            &body,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["guest"], true);
    assert_eq!(json["user"], "Guest (+15550100)");

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/orders/mine")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_guest_wrong_code_is_unauthorized() {
    let app = setup();

    let otp = json!({ "phone": "+15550100" });
    let (status, _) = send(&app, with_body(json_request("POST", "/guest/otp"), &otp)).await;
    assert_eq!(status, StatusCode::OK);

    let verify = json!({ "phone": "+15550100", "code": "000000" });
    let (status, _) = send(
        &app,
        with_body(json_request("POST", "/guest/verify"), &verify),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bad_phone = json!({ "phone": "call me" });
    let (status, _) = send(
        &app,
        with_body(json_request("POST", "/guest/otp"), &bad_phone),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_guest_token_is_unauthorized() {
    let app = setup();
    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/orders/mine")
            .header("authorization", "Bearer not-a-session")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_order_management() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let user_id = UserId::new();

    let (status, json) = send(
        &app,
        user_order(user_id, order_body(&product, &variants[0], 1, "cash")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["id"].as_str().unwrap().to_string();

    // Listing requires the admin key.
    let (status, _) = send(&app, user_get("/orders", user_id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin_get = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header("x-admin-key", ADMIN_KEY)
            .body(Body::empty())
            .unwrap()
    };

    let (status, json) = send(&app, admin_get("/orders?unseen=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = send(&app, admin_put(&format!("/orders/{order_id}/seen"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isSeen"], true);

    let (_, json) = send(&app, admin_get("/orders?unseen=true")).await;
    assert!(json.as_array().unwrap().is_empty());

    let (status, json) = send(&app, admin_put(&format!("/orders/{order_id}/pay"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isPaid"], true);
    assert!(json["paidAt"].is_string());

    let (status, _) = send(&app, admin_put(&format!("/orders/{order_id}/pay"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(&app, admin_put(&format!("/orders/{order_id}/deliver"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isDelivered"], true);

    let (_, json) = send(&app, admin_get("/orders?paid=true&delivered=true")).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        admin_put(&format!("/orders/{}/deliver", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_replace_product_does_not_reprice_orders() {
    let app = setup();
    let (product, variants) = create_phone(&app).await;
    let user_id = UserId::new();

    let (status, json) = send(
        &app,
        user_order(user_id, order_body(&product, &variants[0], 1, "cash")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["id"].as_str().unwrap().to_string();

    let replacement = json!({
        "name": "Phone",
        "category": "Electronics",
        "variants": [
            { "id": variants[0], "price": 150.0, "stock": 10 }
        ]
    });
    let (status, json) = send(
        &app,
        with_body(
            json_request("PUT", &format!("/products/{product}"))
                .header("x-admin-key", ADMIN_KEY),
            &replacement,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["variants"][0]["id"], variants[0].as_str());
    assert_eq!(json["variants"][0]["price"], 150.0);

    let (_, json) = send(&app, user_get(&format!("/orders/{order_id}"), user_id)).await;
    assert_eq!(json["orderItems"][0]["price"], 100.0);
    assert_eq!(json["totalPrice"], 100.0);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let app = setup();
    let (status, _) = send(&app, user_get("/orders/not-a-uuid", UserId::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
