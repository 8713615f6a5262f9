use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{CreditedTransaction, NewCredit, OrderId};

fn confirmations(credit: &NewCredit) -> i64 {
    i64::try_from(credit.confirmations).unwrap_or(i64::MAX)
}

/// Records a payment against an order. The customer id is taken from the order itself, so `None` is returned (and
/// nothing is inserted) if the order does not exist.
///
/// A duplicate `(address, txid, value)` is rejected by the UNIQUE constraint and surfaces as a database error; use
/// [`super::is_unique_violation`] to tell it apart from a genuine failure.
pub async fn insert_order_credit(
    order_id: &OrderId,
    credit: &NewCredit,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreditedTransaction>, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO credited_transactions (address, txid, value, customer_id, order_id, confirmations, credited_at)
            SELECT $1, $2, $3, customer_id, id, $4, $5 FROM orders WHERE id = $6
            RETURNING *;
        "#,
    )
    .bind(&credit.address)
    .bind(&credit.txid)
    .bind(credit.value.value())
    .bind(confirmations(credit))
    .bind(now)
    .bind(order_id.value())
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Records a deposit for a customer. See [`insert_order_credit`] for how duplicates are reported.
pub async fn insert_customer_credit(
    customer_id: &str,
    credit: &NewCredit,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreditedTransaction, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO credited_transactions (address, txid, value, customer_id, order_id, confirmations, credited_at)
            VALUES ($1, $2, $3, $4, NULL, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&credit.address)
    .bind(&credit.txid)
    .bind(credit.value.value())
    .bind(customer_id)
    .bind(confirmations(credit))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_credits_for_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<CreditedTransaction>, sqlx::Error> {
    let credits = sqlx::query_as("SELECT * FROM credited_transactions WHERE address = $1 ORDER BY id")
        .bind(address)
        .fetch_all(conn)
        .await?;
    Ok(credits)
}

/// The first credit recorded for `txid`, if any
pub async fn fetch_credit_by_txid(
    txid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CreditedTransaction>, sqlx::Error> {
    let credit = sqlx::query_as("SELECT * FROM credited_transactions WHERE txid = $1 ORDER BY id LIMIT 1")
        .bind(txid)
        .fetch_optional(conn)
        .await?;
    Ok(credit)
}
