use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::repos::StoreError;

pub type DirectoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("storefront lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub first_name: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.username.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl CartLine {
    pub fn subtotal_cents(&self) -> i64 {
        self.unit_price_cents.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn total_cents(&self) -> i64 {
        self.lines.iter().map(CartLine::subtotal_cents).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub id: i64,
    pub status: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Read-only view of the storefront that owns users, carts and orders.
pub trait CommerceDirectory: Send + Sync {
    fn resolve_bearer_token<'a>(&'a self, token: &'a str) -> DirectoryFuture<'a, Option<Identity>>;

    fn cart_for_user<'a>(&'a self, user_id: i64) -> DirectoryFuture<'a, Option<CartSnapshot>>;

    /// Most recent first, at most `limit` entries.
    fn recent_orders<'a>(
        &'a self,
        user_id: i64,
        limit: usize,
    ) -> DirectoryFuture<'a, Vec<OrderSnapshot>>;
}

#[derive(Default)]
struct DirectoryData {
    tokens: HashMap<String, Identity>,
    carts: HashMap<i64, CartSnapshot>,
    orders: HashMap<i64, Vec<OrderSnapshot>>,
}

/// Fixed storefront data, used by tests and local runs without a storefront
/// database.
#[derive(Clone, Default)]
pub struct InMemoryCommerceDirectory {
    data: Arc<DirectoryData>,
}

impl InMemoryCommerceDirectory {
    pub fn builder() -> InMemoryCommerceDirectoryBuilder {
        InMemoryCommerceDirectoryBuilder::default()
    }
}

#[derive(Default)]
pub struct InMemoryCommerceDirectoryBuilder {
    data: DirectoryData,
}

impl InMemoryCommerceDirectoryBuilder {
    pub fn token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.data.tokens.insert(token.into(), identity);
        self
    }

    pub fn cart(mut self, user_id: i64, cart: CartSnapshot) -> Self {
        self.data.carts.insert(user_id, cart);
        self
    }

    pub fn order(mut self, user_id: i64, order: OrderSnapshot) -> Self {
        self.data.orders.entry(user_id).or_default().push(order);
        self
    }

    pub fn build(self) -> InMemoryCommerceDirectory {
        InMemoryCommerceDirectory {
            data: Arc::new(self.data),
        }
    }
}

impl CommerceDirectory for InMemoryCommerceDirectory {
    fn resolve_bearer_token<'a>(&'a self, token: &'a str) -> DirectoryFuture<'a, Option<Identity>> {
        Box::pin(async move { Ok(self.data.tokens.get(token).cloned()) })
    }

    fn cart_for_user<'a>(&'a self, user_id: i64) -> DirectoryFuture<'a, Option<CartSnapshot>> {
        Box::pin(async move { Ok(self.data.carts.get(&user_id).cloned()) })
    }

    fn recent_orders<'a>(
        &'a self,
        user_id: i64,
        limit: usize,
    ) -> DirectoryFuture<'a, Vec<OrderSnapshot>> {
        Box::pin(async move {
            let mut orders = self.data.orders.get(&user_id).cloned().unwrap_or_default();
            orders.sort_by(|left, right| {
                right
                    .created_at
                    .cmp(&left.created_at)
                    .then_with(|| right.id.cmp(&left.id))
            });
            orders.truncate(limit);
            Ok(orders)
        })
    }
}

/// Renders minor units as `12.50`.
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    format!("{sign}{}.{:02}", absolute / 100, absolute % 100)
}
