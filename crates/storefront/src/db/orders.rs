//! Order repository.
//!
//! Line-item writes and the totals recomputation they trigger run in one
//! transaction, so readers never see an order whose totals disagree with its
//! line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use kestrel_core::{
    DeliveryPolicy, Email, LineItemId, OrderId, OrderNumber, OrderOrigin, ProductId, ProfileId,
    ShippingDetails,
};

use super::RepositoryError;
use crate::models::{NewLineItem, NewOrder, Order, OrderInsert, OrderLineItem, OrderMatch};

const ORDER_COLUMNS: &str = "id, order_number, user_profile_id, full_name, email, phone_number, \
                             country, postcode, town_or_city, street_address1, street_address2, \
                             county, date, delivery_cost, order_total, grand_total, original_bag, \
                             stripe_pid, origin";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: OrderNumber,
    user_profile_id: Option<ProfileId>,
    full_name: String,
    email: String,
    phone_number: String,
    country: String,
    postcode: Option<String>,
    town_or_city: String,
    street_address1: String,
    street_address2: Option<String>,
    county: Option<String>,
    date: DateTime<Utc>,
    delivery_cost: Decimal,
    order_total: Decimal,
    grand_total: Decimal,
    original_bag: String,
    stripe_pid: String,
    origin: OrderOrigin,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid email on order {}: {e}",
                row.order_number
            ))
        })?;

        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            user_profile_id: row.user_profile_id,
            shipping: ShippingDetails {
                full_name: row.full_name,
                email,
                phone_number: row.phone_number,
                country: row.country,
                postcode: row.postcode,
                town_or_city: row.town_or_city,
                street_address1: row.street_address1,
                street_address2: row.street_address2,
                county: row.county,
            },
            date: row.date,
            delivery_cost: row.delivery_cost,
            order_total: row.order_total,
            grand_total: row.grand_total,
            original_bag: row.original_bag,
            stripe_pid: row.stripe_pid,
            origin: row.origin,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: LineItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    product_size: Option<String>,
    quantity: i32,
    lineitem_total: Decimal,
}

impl TryFrom<LineItemRow> for OrderLineItem {
    type Error = RepositoryError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "line item {} has quantity {}",
                row.id, row.quantity
            ))
        })?;

        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_size: row.product_size,
            quantity,
            lineitem_total: row.lineitem_total,
        })
    }
}

fn to_db_quantity(quantity: u32) -> Result<i32, RepositoryError> {
    if quantity == 0 {
        return Err(RepositoryError::Conflict(
            "line item quantity must be positive".to_string(),
        ));
    }
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::Conflict(format!("line item quantity {quantity} too large")))
}

/// Repository for orders and their line items.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
    delivery: DeliveryPolicy,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool, delivery: DeliveryPolicy) -> Self {
        Self { pool, delivery }
    }

    /// Insert an order with zero totals.
    ///
    /// `stripe_pid` is unique. If another request stored an order for the
    /// same payment intent first, that order is returned as
    /// [`OrderInsert::Existing`] and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn create(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        let s = &order.shipping;
        let inserted = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.orders
                (order_number, user_profile_id, full_name, email, phone_number, country,
                 postcode, town_or_city, street_address1, street_address2, county,
                 original_bag, stripe_pid, origin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (stripe_pid) WHERE stripe_pid <> '' DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_profile_id)
        .bind(&s.full_name)
        .bind(s.email.as_str())
        .bind(&s.phone_number)
        .bind(&s.country)
        .bind(&s.postcode)
        .bind(&s.town_or_city)
        .bind(&s.street_address1)
        .bind(&s.street_address2)
        .bind(&s.county)
        .bind(&order.original_bag)
        .bind(&order.stripe_pid)
        .bind(order.origin)
        .fetch_optional(self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(OrderInsert::Created(row.try_into()?));
        }

        let existing = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE stripe_pid = $1"
        ))
        .bind(&order.stripe_pid)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(OrderInsert::Existing(existing.try_into()?))
    }

    /// Get an order by its public number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE order_number = $1"
        ))
        .bind(number)
        .fetch_optional(self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    /// Find an order whose contact, address, totals, bag and payment intent
    /// all match `key`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_matching(&self, key: &OrderMatch) -> Result<Option<Order>, RepositoryError> {
        let s = &key.shipping;
        sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM storefront.orders
            WHERE LOWER(full_name) = LOWER($1)
              AND LOWER(email) = LOWER($2)
              AND LOWER(phone_number) = LOWER($3)
              AND LOWER(country) = LOWER($4)
              AND LOWER(postcode) IS NOT DISTINCT FROM LOWER($5)
              AND LOWER(town_or_city) = LOWER($6)
              AND LOWER(street_address1) = LOWER($7)
              AND LOWER(street_address2) IS NOT DISTINCT FROM LOWER($8)
              AND LOWER(county) IS NOT DISTINCT FROM LOWER($9)
              AND grand_total = $10
              AND LOWER(original_bag) = LOWER($11)
              AND LOWER(stripe_pid) = LOWER($12)
            ORDER BY id
            LIMIT 1
            "
        ))
        .bind(&s.full_name)
        .bind(s.email.as_str())
        .bind(&s.phone_number)
        .bind(&s.country)
        .bind(&s.postcode)
        .bind(&s.town_or_city)
        .bind(&s.street_address1)
        .bind(&s.street_address2)
        .bind(&s.county)
        .bind(key.grand_total)
        .bind(&key.original_bag)
        .bind(&key.stripe_pid)
        .fetch_optional(self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    /// Delete an order. Line items cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: OrderId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.orders WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Attach an order to a profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn attach_profile(
        &self,
        order_id: OrderId,
        profile_id: ProfileId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE storefront.orders SET user_profile_id = $2 WHERE id = $1")
                .bind(order_id)
                .bind(profile_id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Line items of an order with product names, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT li.id, li.order_id, li.product_id, p.name AS product_name,
                   li.product_size, li.quantity, li.lineitem_total
            FROM storefront.order_line_items li
            JOIN storefront.products p ON p.id = li.product_id
            WHERE li.order_id = $1
            ORDER BY li.id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(OrderLineItem::try_from).collect()
    }

    /// Add a line item and recompute the order's totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a zero quantity.
    /// Returns `RepositoryError::Database` if a query fails, including a
    /// foreign-key violation for an unknown order or product.
    pub async fn add_line_item(
        &self,
        order_id: OrderId,
        item: &NewLineItem,
    ) -> Result<OrderLineItem, RepositoryError> {
        let quantity = to_db_quantity(item.quantity)?;
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, LineItemId>(
            r"
            INSERT INTO storefront.order_line_items
                (order_id, product_id, product_size, quantity, lineitem_total)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(&item.product_size)
        .bind(quantity)
        .bind(item.total())
        .fetch_one(&mut *tx)
        .await?;

        recompute_totals(&mut tx, order_id, &self.delivery).await?;

        let row = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT li.id, li.order_id, li.product_id, p.name AS product_name,
                   li.product_size, li.quantity, li.lineitem_total
            FROM storefront.order_line_items li
            JOIN storefront.products p ON p.id = li.product_id
            WHERE li.id = $1
            ",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Change a line item's quantity, re-pricing it at the current product
    /// price, and recompute the order's totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a zero quantity.
    /// Returns `RepositoryError::NotFound` if the line item does not exist.
    pub async fn update_line_item_quantity(
        &self,
        id: LineItemId,
        quantity: u32,
    ) -> Result<Order, RepositoryError> {
        let quantity = to_db_quantity(quantity)?;
        let mut tx = self.pool.begin().await?;

        let order_id = sqlx::query_scalar::<_, OrderId>(
            r"
            UPDATE storefront.order_line_items li
            SET quantity = $2, lineitem_total = p.price * $2
            FROM storefront.products p
            WHERE li.id = $1 AND p.id = li.product_id
            RETURNING li.order_id
            ",
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let order = recompute_totals(&mut tx, order_id, &self.delivery).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Delete a line item and recompute the order's totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line item does not exist.
    pub async fn delete_line_item(&self, id: LineItemId) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_id = sqlx::query_scalar::<_, OrderId>(
            "DELETE FROM storefront.order_line_items WHERE id = $1 RETURNING order_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let order = recompute_totals(&mut tx, order_id, &self.delivery).await?;
        tx.commit().await?;
        Ok(order)
    }
}

/// Recompute `order_total`, `delivery_cost` and `grand_total` from the
/// order's current line items. Safe to run any number of times.
async fn recompute_totals(
    conn: &mut PgConnection,
    order_id: OrderId,
    delivery: &DeliveryPolicy,
) -> Result<Order, RepositoryError> {
    let order_total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(lineitem_total), 0) FROM storefront.order_line_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    let delivery_cost = delivery.delivery_cost(order_total);
    let grand_total = order_total + delivery_cost;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE storefront.orders
        SET order_total = $2, delivery_cost = $3, grand_total = $4
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(order_id)
    .bind(order_total)
    .bind(delivery_cost)
    .bind(grand_total)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    row.try_into()
}
