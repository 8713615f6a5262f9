use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::AddressAssignment;

pub async fn fetch_assignment(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AddressAssignment>, sqlx::Error> {
    let assignment =
        sqlx::query_as("SELECT * FROM address_assignments WHERE customer_id = $1 AND address IS NOT NULL")
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
    Ok(assignment)
}

pub async fn fetch_assignment_by_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AddressAssignment>, sqlx::Error> {
    let assignment = sqlx::query_as("SELECT * FROM address_assignments WHERE address = $1")
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(assignment)
}

pub async fn touch_assignment(
    customer_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<AddressAssignment>, sqlx::Error> {
    let assignment = sqlx::query_as(
        r#"
            UPDATE address_assignments SET last_activity_at = $1
            WHERE customer_id = $2 AND address IS NOT NULL
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(customer_id)
    .fetch_optional(conn)
    .await?;
    Ok(assignment)
}

/// Reserves the next derivation index for the customer. The row has no address until [`set_address`] is called in the
/// same transaction. A second reservation for the same customer violates the primary key.
pub async fn reserve_next_index(
    customer_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let (index,): (i64,) = sqlx::query_as(
        r#"
            INSERT INTO address_assignments (customer_id, derivation_index, address, created_at, last_activity_at)
            VALUES ($1, (SELECT COALESCE(MAX(derivation_index) + 1, 0) FROM address_assignments), NULL, $2, $2)
            RETURNING derivation_index;
        "#,
    )
    .bind(customer_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(index)
}

pub async fn set_address(
    customer_id: &str,
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<AddressAssignment, sqlx::Error> {
    let assignment = sqlx::query_as("UPDATE address_assignments SET address = $1 WHERE customer_id = $2 RETURNING *")
        .bind(address)
        .bind(customer_id)
        .fetch_one(conn)
        .await?;
    Ok(assignment)
}

/// Assignments with activity since `since`, plus those of customers that still have a pending order.
pub async fn fetch_active_assignments(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<AddressAssignment>, sqlx::Error> {
    let assignments = sqlx::query_as(
        r#"
            SELECT * FROM address_assignments
            WHERE address IS NOT NULL AND (
                last_activity_at >= $1 OR
                customer_id IN (SELECT customer_id FROM orders WHERE status = 'Pending')
            )
            ORDER BY derivation_index;
        "#,
    )
    .bind(since)
    .fetch_all(conn)
    .await?;
    Ok(assignments)
}
