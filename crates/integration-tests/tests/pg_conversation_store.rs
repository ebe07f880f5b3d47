mod support;

use std::sync::Arc;

use axum::http::StatusCode;
use chat_core::commerce::{CommerceDirectory, InMemoryCommerceDirectory};
use chat_core::conversation::{ConversationStore, HistoryTurn, MessageRole, OwnerKey};
use chrono::{Duration, Utc};
use serde_json::json;
use serial_test::serial;

use support::api_app::build_test_router_with_store;
use support::mock_provider::MockProvider;
use support::{
    insert_storefront_user, json_request, reset_database, reset_storefront, send, test_store,
};

fn turn(role: MessageRole, body: &str) -> HistoryTurn {
    HistoryTurn {
        role,
        body: body.to_string(),
    }
}

#[tokio::test]
#[serial]
async fn history_is_windowed_oldest_first_and_scoped_per_owner() {
    let Some(store) = test_store().await else {
        return;
    };
    reset_database(store.pool()).await;

    let owner = OwnerKey::User(7);
    let stranger = OwnerKey::Session("other-session".to_string());
    for index in 0..6 {
        let role = if index % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        store
            .append(&owner, role, &format!("message {index}"))
            .await
            .expect("append should succeed");
    }
    store
        .append(&stranger, MessageRole::User, "not yours")
        .await
        .expect("append should succeed");

    let history = store
        .recent_history(&owner, 4, None)
        .await
        .expect("history should load");
    assert_eq!(
        history,
        vec![
            turn(MessageRole::User, "message 2"),
            turn(MessageRole::Assistant, "message 3"),
            turn(MessageRole::User, "message 4"),
            turn(MessageRole::Assistant, "message 5"),
        ]
    );

    let none = store
        .recent_history(&owner, 0, None)
        .await
        .expect("empty window should load");
    assert!(none.is_empty());
}

#[tokio::test]
#[serial]
async fn history_leaves_out_the_excluded_message() {
    let Some(store) = test_store().await else {
        return;
    };
    reset_database(store.pool()).await;

    let owner = OwnerKey::Session("session-abc".to_string());
    store
        .append(&owner, MessageRole::User, "earlier question")
        .await
        .expect("append should succeed");
    store
        .append(&owner, MessageRole::Assistant, "earlier answer")
        .await
        .expect("append should succeed");
    let current = store
        .append(&owner, MessageRole::User, "current question")
        .await
        .expect("append should succeed");

    let history = store
        .recent_history(&owner, 10, Some(current))
        .await
        .expect("history should load");
    assert_eq!(
        history,
        vec![
            turn(MessageRole::User, "earlier question"),
            turn(MessageRole::Assistant, "earlier answer"),
        ]
    );
}

#[tokio::test]
#[serial]
async fn storefront_lookups_resolve_tokens_carts_and_orders() {
    let Some(store) = test_store().await else {
        return;
    };
    let pool = store.pool().clone();
    reset_storefront(&pool).await;

    let user_id = insert_storefront_user(&pool, "asha", Some("Asha"), "live-token", true).await;
    insert_storefront_user(&pool, "ravi", None, "dormant-token", false).await;

    let identity = store
        .resolve_bearer_token("live-token")
        .await
        .expect("lookup should succeed")
        .expect("active token should resolve");
    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.display_name(), "Asha");
    assert!(
        store
            .resolve_bearer_token("dormant-token")
            .await
            .expect("lookup should succeed")
            .is_none()
    );
    assert!(
        store
            .resolve_bearer_token("missing")
            .await
            .expect("lookup should succeed")
            .is_none()
    );

    assert!(
        store
            .cart_for_user(user_id)
            .await
            .expect("cart lookup should succeed")
            .is_none()
    );

    let product_id: i32 = sqlx::query_scalar(
        "INSERT INTO products_product (name, price) VALUES ('Cetirizine 10mg', 45.50) RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .expect("product insert should succeed");
    let cart_id: i32 =
        sqlx::query_scalar("INSERT INTO cart_cart (user_id) VALUES ($1) RETURNING id")
            .bind(user_id as i32)
            .fetch_one(&pool)
            .await
            .expect("cart insert should succeed");
    sqlx::query("INSERT INTO cart_cartitem (cart_id, product_id, quantity) VALUES ($1, $2, 3)")
        .bind(cart_id)
        .bind(product_id)
        .execute(&pool)
        .await
        .expect("cart item insert should succeed");

    let cart = store
        .cart_for_user(user_id)
        .await
        .expect("cart lookup should succeed")
        .expect("cart should exist");
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].product_name, "Cetirizine 10mg");
    assert_eq!(cart.lines[0].quantity, 3);
    assert_eq!(cart.total_cents(), 13_650);

    let now = Utc::now();
    for (days_ago, status) in [(4, "Delivered"), (3, "Shipped"), (2, "Processing"), (1, "Pending")] {
        sqlx::query(
            "INSERT INTO products_order (user_id, status, total_price, created_at)
             VALUES ($1, $2, 120.00, $3)",
        )
        .bind(user_id as i32)
        .bind(status)
        .bind(now - Duration::days(days_ago))
        .execute(&pool)
        .await
        .expect("order insert should succeed");
    }

    let orders = store
        .recent_orders(user_id, 3)
        .await
        .expect("orders should load");
    let statuses: Vec<&str> = orders.iter().map(|order| order.status.as_str()).collect();
    assert_eq!(statuses, vec!["Pending", "Processing", "Shipped"]);
    assert!(orders.iter().all(|order| order.total_cents == 12_000));
}

#[tokio::test]
#[serial]
async fn chat_turns_persist_through_postgres() {
    let Some(store) = test_store().await else {
        return;
    };
    reset_database(store.pool()).await;
    let store = Arc::new(store);

    let provider = MockProvider::start(Vec::new()).await;
    let router = build_test_router_with_store(
        &provider,
        InMemoryCommerceDirectory::default(),
        store.clone(),
    );

    let response = send(
        &router,
        json_request(
            "/api/chat/",
            &[("x-chat-session", "pg-session-1")],
            json!({ "message": "I have a fever" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let history = store
        .recent_history(&OwnerKey::Session("pg-session-1".to_string()), 10, None)
        .await
        .expect("history should load");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], turn(MessageRole::User, "I have a fever"));
    assert_eq!(history[1].role, MessageRole::Assistant);

    provider.stop().await;
}
