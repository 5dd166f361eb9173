//! HTTP Command Transport Tests
//!
//! Exercises the `reqwest` transport and the command client's error mapping
//! against a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trading_client::{
    CommandClient, CommandError, CommandTransport, HttpCommandTransport, HttpConfig, OrderId,
    OrderRequest, OrderSide, OrderState, TransportError,
};

const API_KEY: &str = "test-key";

fn transport(server: &MockServer) -> HttpCommandTransport {
    HttpCommandTransport::new(&HttpConfig {
        base_url: format!("{}/api/v1", server.uri()),
        api_key: API_KEY.to_string(),
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

fn order_json(id: &str, state: &str) -> serde_json::Value {
    json!({
        "order_id": id,
        "symbol": "INFY",
        "order_type": "BUY",
        "order_style": "LIMIT",
        "quantity": 10,
        "price": 1500.0,
        "state": state,
        "created_at": "2024-03-01T09:15:30.123456",
        "user_id": "demo-user"
    })
}

#[tokio::test]
async fn place_order_posts_request_with_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orders"))
        .and(header("x-api-key", API_KEY))
        .and(body_json(json!({
            "symbol": "INFY",
            "order_type": "BUY",
            "order_style": "LIMIT",
            "quantity": 10,
            "price": 1500.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("o-1", "PLACED")))
        .expect(1)
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let order = client
        .place_order(OrderRequest::limit("infy", OrderSide::Buy, 10, dec!(1500)))
        .await
        .unwrap();

    assert_eq!(order.order_id, OrderId::new("o-1"));
    assert_eq!(order.state, OrderState::Placed);
    assert_eq!(order.price, Some(dec!(1500)));
}

#[tokio::test]
async fn cancel_of_executed_order_is_invalid_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orders/o-2/cancel"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Order is already executed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let err = client.cancel_order(&OrderId::new("o-2")).await.unwrap_err();

    match err {
        CommandError::InvalidState { order_id, reason } => {
            assert_eq!(order_id, OrderId::new("o-2"));
            assert_eq!(reason, "Order is already executed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_key_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/portfolio"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid API key"})))
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let err = client.get_portfolio().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err, CommandError::Unauthorized("Invalid API key".to_string()));
}

#[tokio::test]
async fn failed_place_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let err = client
        .place_order(OrderRequest::market("INFY", OrderSide::Sell, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Unknown(ref message) if message.contains("503")));
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders/o-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"order_id": "o-3"})))
        .mount(&server)
        .await;

    let err = transport(&server)
        .get_order(&OrderId::new("o-3"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Decode(_)));
}

#[tokio::test]
async fn snapshot_fetches_unknown_orders_behind_trades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/portfolio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "demo-user",
            "holdings": [{"symbol": "INFY", "quantity": 10, "avg_price": 1500.0, "current_value": 15100.0}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "trade_id": "t-1",
            "order_id": "o-9",
            "symbol": "INFY",
            "side": "BUY",
            "quantity": 10,
            "price": 1500.0,
            "timestamp": "2024-03-01T09:15:31",
            "user_id": "demo-user"
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instruments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "symbol": "INFY",
            "exchange": "NSE",
            "instrument_type": "EQ",
            "last_traded_price": 1510.0
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders/o-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_json("o-9", "EXECUTED")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders/o-gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Order not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let snapshot = client
        .fetch_snapshot(trading_client::application::services::SnapshotScope {
            open_orders: vec![OrderId::new("o-gone")],
            known_orders: [OrderId::new("o-gone")].into_iter().collect(),
        })
        .await
        .unwrap();

    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.orders[0].state, OrderState::Executed);
    assert_eq!(snapshot.trades.len(), 1);
    assert_eq!(snapshot.portfolio.holdings[0].quantity, 10);
    assert_eq!(snapshot.instruments[0].last_traded_price, dec!(1510));
}

#[tokio::test]
async fn instrument_lookup_is_case_insensitive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instruments/TCS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "TCS",
            "exchange": "NSE",
            "instrument_type": "EQ",
            "last_traded_price": 3800.0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CommandClient::new(Arc::new(transport(&server)));
    let instrument = client.get_instrument(" tcs ").await.unwrap();

    assert_eq!(instrument.symbol, "TCS");
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let transport = HttpCommandTransport::new(&HttpConfig {
        base_url: "http://127.0.0.1:1/api/v1".to_string(),
        api_key: API_KEY.to_string(),
        timeout: Duration::from_secs(1),
    })
    .unwrap();

    let err = CommandClient::new(Arc::new(transport))
        .get_trades()
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Network(_)));
}
