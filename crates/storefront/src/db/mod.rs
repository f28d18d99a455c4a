//! Database operations for storefront `PostgreSQL`.
//!
//! # Schema: `storefront`
//!
//! - `categories` - Product categories
//! - `products` - Catalog, priced in the store currency
//! - `user_profiles` - Saved delivery defaults per user account
//! - `orders` - One row per paid payment intent
//! - `order_line_items` - Product/size/quantity rows of an order
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p kestrel-cli -- migrate
//! ```
//!
//! # Store traits
//!
//! The checkout and webhook services talk to storage through
//! [`ProductCatalog`], [`OrderStore`] and [`ProfileStore`]. [`PgStore`]
//! implements them on top of the repositories in this module; tests use the
//! in-memory store from `crate::testing`.

pub mod orders;
pub mod products;
pub mod profiles;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use kestrel_core::{
    DeliveryPolicy, LineItemId, OrderId, OrderNumber, Product, ProductId, ProfileId,
};

use crate::models::{
    CurrentUser, NewLineItem, NewOrder, Order, OrderInsert, OrderLineItem, OrderMatch,
    ProfileDefaults, UserProfile,
};

pub use orders::OrderRepository;
pub use products::{ProductQuery, ProductRepository, SortDirection, SortKey};
pub use profiles::ProfileRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or invalid write.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Read access to the product catalog.
pub trait ProductCatalog: Send + Sync {
    /// Look up a single product.
    fn get_product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// Look up several products at once. Unknown IDs are simply absent from
    /// the returned map.
    fn get_products(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<HashMap<ProductId, Product>, RepositoryError>> + Send;
}

/// Order persistence.
///
/// Every line-item write recomputes the owning order's totals before it
/// returns, so an order read back after any of these calls is consistent.
pub trait OrderStore: Send + Sync {
    /// Insert an order, or return the order already stored for its
    /// payment intent.
    fn create_order(
        &self,
        order: &NewOrder,
    ) -> impl Future<Output = Result<OrderInsert, RepositoryError>> + Send;

    /// Add a line item and recompute totals.
    fn add_line_item(
        &self,
        order_id: OrderId,
        item: &NewLineItem,
    ) -> impl Future<Output = Result<OrderLineItem, RepositoryError>> + Send;

    /// Change a line item's quantity and recompute totals. Returns the
    /// updated order.
    fn update_line_item_quantity(
        &self,
        id: LineItemId,
        quantity: u32,
    ) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Delete a line item and recompute totals. Returns the updated order.
    fn delete_line_item(
        &self,
        id: LineItemId,
    ) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Delete an order and, by cascade, its line items.
    fn delete_order(&self, id: OrderId) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Find an order matching every field of `key`.
    fn find_matching(
        &self,
        key: &OrderMatch,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Look up an order by its public number.
    fn get_by_number(
        &self,
        number: &OrderNumber,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Line items of an order, oldest first.
    fn line_items(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Vec<OrderLineItem>, RepositoryError>> + Send;

    /// Attach an order to a customer profile.
    fn attach_profile(
        &self,
        order_id: OrderId,
        profile_id: ProfileId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Customer profile persistence.
pub trait ProfileStore: Send + Sync {
    /// Look up a profile by login name.
    fn get_profile_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>, RepositoryError>> + Send;

    /// Fetch the signed-in user's profile, creating an empty one on first use.
    fn get_or_create_profile(
        &self,
        user: &CurrentUser,
    ) -> impl Future<Output = Result<UserProfile, RepositoryError>> + Send;

    /// Replace a profile's saved delivery defaults.
    fn update_defaults(
        &self,
        id: ProfileId,
        defaults: &ProfileDefaults,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// `PostgreSQL` implementation of the store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    delivery: DeliveryPolicy,
}

impl PgStore {
    /// Wrap a pool. `delivery` prices orders when their totals are recomputed.
    #[must_use]
    pub const fn new(pool: PgPool, delivery: DeliveryPolicy) -> Self {
        Self { pool, delivery }
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(&self.pool)
    }

    fn orders(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.pool, self.delivery)
    }

    fn profiles(&self) -> ProfileRepository<'_> {
        ProfileRepository::new(&self.pool)
    }
}

impl ProductCatalog for PgStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.products().get_by_id(id).await
    }

    async fn get_products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        self.products().get_many(ids).await
    }
}

impl OrderStore for PgStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        self.orders().create(order).await
    }

    async fn add_line_item(
        &self,
        order_id: OrderId,
        item: &NewLineItem,
    ) -> Result<OrderLineItem, RepositoryError> {
        self.orders().add_line_item(order_id, item).await
    }

    async fn update_line_item_quantity(
        &self,
        id: LineItemId,
        quantity: u32,
    ) -> Result<Order, RepositoryError> {
        self.orders().update_line_item_quantity(id, quantity).await
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<Order, RepositoryError> {
        self.orders().delete_line_item(id).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), RepositoryError> {
        self.orders().delete(id).await
    }

    async fn find_matching(&self, key: &OrderMatch) -> Result<Option<Order>, RepositoryError> {
        self.orders().find_matching(key).await
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        self.orders().get_by_number(number).await
    }

    async fn line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError> {
        self.orders().line_items(order_id).await
    }

    async fn attach_profile(
        &self,
        order_id: OrderId,
        profile_id: ProfileId,
    ) -> Result<(), RepositoryError> {
        self.orders().attach_profile(order_id, profile_id).await
    }
}

impl ProfileStore for PgStore {
    async fn get_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        self.profiles().get_by_username(username).await
    }

    async fn get_or_create_profile(&self, user: &CurrentUser) -> Result<UserProfile, RepositoryError> {
        self.profiles().get_or_create(user.id, &user.username).await
    }

    async fn update_defaults(
        &self,
        id: ProfileId,
        defaults: &ProfileDefaults,
    ) -> Result<(), RepositoryError> {
        self.profiles().update_defaults(id, defaults).await
    }
}
