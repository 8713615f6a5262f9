use chrono::{DateTime, Utc};
use lpg_common::Litoshi;
use sqlx::SqliteConnection;

use crate::db_types::Balance;

pub async fn fetch_balance(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<Balance>, sqlx::Error> {
    let balance = sqlx::query_as("SELECT * FROM balances WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance)
}

/// Adds `amount` to the customer's balance, creating the balance if this is the customer's first credit.
pub async fn credit_balance(
    customer_id: &str,
    amount: Litoshi,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Balance, sqlx::Error> {
    let balance = sqlx::query_as(
        r#"
            INSERT INTO balances (customer_id, amount, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE SET amount = amount + excluded.amount, updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(amount.value())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Subtracts `amount` from the balance only if the balance covers it. The check and the subtraction are one statement,
/// so there is no window for a concurrent debit to slip in between them. Returns `None` if funds are insufficient (or
/// the customer has no balance).
pub async fn debit_balance(
    customer_id: &str,
    amount: Litoshi,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Balance>, sqlx::Error> {
    let balance = sqlx::query_as(
        r#"
            UPDATE balances SET amount = amount - $1, updated_at = $2
            WHERE customer_id = $3 AND amount >= $1
            RETURNING *;
        "#,
    )
    .bind(amount.value())
    .bind(now)
    .bind(customer_id)
    .fetch_optional(conn)
    .await?;
    Ok(balance)
}
