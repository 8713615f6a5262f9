use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, Product};

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn fetch_active_products(conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    let products = sqlx::query_as("SELECT * FROM products WHERE active = 1 ORDER BY id").fetch_all(conn).await?;
    Ok(products)
}

pub async fn upsert_product(
    id: Option<i64>,
    product: NewProduct,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (id, name, description, price, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                price = excluded.price,
                active = excluded.active,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(product.name)
    .bind(product.description)
    .bind(product.price.value())
    .bind(product.active)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(product)
}
