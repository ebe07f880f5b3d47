#![allow(dead_code)]

pub mod api_app;
pub mod mock_provider;

use std::path::PathBuf;

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chat_core::repos::Store;
use serde_json::{Value, json};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::OnceCell;
use tower::ServiceExt;

static MIGRATIONS_APPLIED: OnceCell<()> = OnceCell::const_new();

pub const MULTIPART_BOUNDARY: &str = "pharmacare-test-boundary";

pub struct JsonResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl JsonResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> JsonResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");
    let body = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));

    JsonResponse {
        status,
        headers,
        body,
    }
}

pub fn json_request(uri: &str, extra_headers: &[(&str, &str)], body: Value) -> Request<Body> {
    raw_json_request(uri, extra_headers, body.to_string())
}

pub fn raw_json_request(uri: &str, extra_headers: &[(&str, &str)], body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body)).expect("request should build")
}

/// One multipart part: `(field name, optional (filename, content type), bytes)`.
pub type MultipartPart<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

pub fn multipart_request(
    uri: &str,
    extra_headers: &[(&str, &str)],
    parts: &[MultipartPart<'_>],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, bytes) in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match file {
            Some((filename, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        );
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body)).expect("request should build")
}

/// `None` when no database is configured for this run.
pub async fn test_store() -> Option<Store> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    apply_migrations_once(&database_url).await;

    Some(
        Store::connect(&database_url, 5)
            .await
            .expect("test store connection should succeed"),
    )
}

pub async fn reset_database(pool: &PgPool) {
    sqlx::query("TRUNCATE TABLE chat_messages RESTART IDENTITY")
        .execute(pool)
        .await
        .expect("database reset should succeed");
}

async fn apply_migrations_once(database_url: &str) {
    MIGRATIONS_APPLIED
        .get_or_init(|| async move {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(database_url)
                .await
                .expect("migration pool connection should succeed");

            let migrations_dir =
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations");
            let migrator = sqlx::migrate::Migrator::new(migrations_dir)
                .await
                .expect("migrations should load");
            migrator
                .run(&pool)
                .await
                .expect("migrations should apply successfully");
        })
        .await;
}

/// Minimal copies of the storefront tables the commerce queries read.
const STOREFRONT_FIXTURE_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS auth_user (
        id SERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        first_name TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS authtoken_token (
        key TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES auth_user(id)
    )",
    "CREATE TABLE IF NOT EXISTS products_product (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        price NUMERIC(10, 2) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cart_cart (
        id SERIAL PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES auth_user(id)
    )",
    "CREATE TABLE IF NOT EXISTS cart_cartitem (
        id SERIAL PRIMARY KEY,
        cart_id INTEGER NOT NULL REFERENCES cart_cart(id),
        product_id INTEGER NOT NULL REFERENCES products_product(id),
        quantity INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products_order (
        id SERIAL PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES auth_user(id),
        status TEXT NOT NULL,
        total_price NUMERIC(10, 2) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

pub async fn reset_storefront(pool: &PgPool) {
    for statement in STOREFRONT_FIXTURE_SQL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("storefront fixture table should exist");
    }
    sqlx::query(
        "TRUNCATE TABLE cart_cartitem, cart_cart, products_order, authtoken_token,
            products_product, auth_user RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .expect("storefront reset should succeed");
}

pub async fn insert_storefront_user(
    pool: &PgPool,
    username: &str,
    first_name: Option<&str>,
    token: &str,
    is_active: bool,
) -> i64 {
    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO auth_user (username, first_name, is_active) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(username)
    .bind(first_name)
    .bind(is_active)
    .fetch_one(pool)
    .await
    .expect("user insert should succeed");

    sqlx::query("INSERT INTO authtoken_token (key, user_id) VALUES ($1, $2)")
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("token insert should succeed");

    i64::from(user_id)
}
