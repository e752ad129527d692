//! HTTP-surface tests: routing, extractors, response envelopes, and error
//! bodies, against the real router with an in-memory database.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::TestHarness;
use serde_json::{json, Value};
use tower::ServiceExt;

use tourbook_api::{app_router, config::AppConfig, AppServices, AppState};

async fn test_app() -> (TestHarness, Router) {
    let harness = TestHarness::new().await;
    let cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        0,
        "test".to_string(),
    );
    let services = AppServices::build(harness.db.clone(), harness.events.clone(), &cfg);
    let state = AppState {
        db: harness.db.clone(),
        config: cfg,
        event_sender: harness.events.clone(),
        services,
    };
    let router = app_router(state);
    (harness, router)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(payload) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (_harness, router) = test_app().await;

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&router, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn tour_lifecycle_over_http() {
    let (_harness, router) = test_app().await;

    let payload = json!({
        "name": "Harbor kayak tour",
        "description": "Three hours on the water",
        "price": "120.00",
        "price_sol": "1.8",
        "price_btc": "0.003",
        "price_eth": "0.06",
        "duration": "3h",
        "location": "Porto",
        "capacity": 8
    });
    let (status, body) = send(&router, Method::POST, "/api/v1/tours", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let tour_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&router, Method::GET, "/api/v1/tours", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &router,
        Method::PUT,
        &format!("/api/v1/tours/{tour_id}"),
        Some(json!({ "name": "Harbor kayak tour (sunset)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Harbor kayak tour (sunset)");

    let (status, body) = send(
        &router,
        Method::GET,
        &format!("/api/v1/tours/{tour_id}/availability"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["capacity"], 8);
    assert_eq!(body["data"]["active_bookings"], 0);
    assert_eq!(body["data"]["available"], true);
}

#[tokio::test]
async fn missing_tour_yields_a_structured_404() {
    let (_harness, router) = test_app().await;

    let (status, body) = send(
        &router,
        Method::GET,
        "/api/v1/tours/550e8400-e29b-41d4-a716-446655440000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
    assert!(body["message"].as_str().unwrap().contains("not found"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn invalid_tour_payload_is_rejected() {
    let (_harness, router) = test_app().await;

    let payload = json!({
        "name": "",
        "price": "10",
        "price_sol": "0.1",
        "price_btc": "0.001",
        "price_eth": "0.01"
    });
    let (status, _body) = send(&router, Method::POST, "/api/v1/tours", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let (_harness, router) = test_app().await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/payments/doge",
        Some(json!({
            "tour_id": "550e8400-e29b-41d4-a716-446655440000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("doge"));
}

#[tokio::test]
async fn booking_list_paginates_even_when_empty() {
    let (_harness, router) = test_app().await;

    let (status, body) = send(
        &router,
        Method::GET,
        "/api/v1/bookings?page=1&per_page=5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["per_page"], 5);
}
