use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, Order, OrderId, OrderStatusType};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// New orders are always `Pending`.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                product_id,
                required_amount,
                target_address,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'Pending', $5, $5)
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.product_id)
    .bind(order.required_amount.value())
    .bind(order.target_address)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Order {} inserted for {} on {}", order.id, order.required_amount, order.target_address);
    Ok(order)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.value()).fetch_optional(conn).await?;
    Ok(order)
}

/// Pending orders paying into `address`, oldest first
pub async fn fetch_pending_orders_for_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE target_address = $1 AND status = 'Pending' ORDER BY created_at ASC, id ASC",
    )
    .bind(address)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Pending orders for the customer, oldest first
pub async fn fetch_pending_orders_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE customer_id = $1 AND status = 'Pending' ORDER BY created_at ASC, id ASC",
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_pending_order_addresses(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let addresses: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT target_address FROM orders WHERE status = 'Pending' ORDER BY target_address")
            .fetch_all(conn)
            .await?;
    Ok(addresses.into_iter().map(|(a,)| a).collect())
}

/// The `Pending -> Paid` transition. The update only applies if the order is still pending, so a concurrent caller
/// that got there first makes this return `None`.
pub async fn mark_paid(
    id: OrderId,
    txid: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Paid', txid = $1, paid_at = $2, updated_at = $2
            WHERE id = $3 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(txid)
    .bind(now)
    .bind(id.value())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves a pending order to `status` (one of the terminal failure states). Returns `None` if the order is not pending.
pub async fn annul_order(
    id: OrderId,
    status: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = 'Pending' RETURNING *",
    )
    .bind(status.to_string())
    .bind(now)
    .bind(id.value())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Expires every pending order created before `cutoff`.
pub async fn expire_orders(
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Expired', updated_at = $1
            WHERE status = 'Pending' AND created_at < $2
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
