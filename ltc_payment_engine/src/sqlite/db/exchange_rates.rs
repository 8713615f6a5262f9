use sqlx::SqliteConnection;

use crate::{rates::ExchangeRate, traits::ExchangeRateError};

pub async fn fetch_last_rate(currency: &str, conn: &mut SqliteConnection) -> Result<ExchangeRate, ExchangeRateError> {
    let result: ExchangeRate = sqlx::query_as(
        r#"SELECT base_currency, rate, updated_at FROM exchange_rates
        WHERE base_currency = $1 ORDER BY updated_at DESC, id DESC LIMIT 1"#,
    )
    .bind(currency.to_lowercase())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ExchangeRateError::RateDoesNotExist(currency.to_string()))?;
    Ok(result)
}

pub async fn set_exchange_rate(rate: &ExchangeRate, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    sqlx::query("INSERT INTO exchange_rates (base_currency, rate, updated_at) VALUES ($1, $2, $3)")
        .bind(rate.base_currency.to_lowercase())
        .bind(rate.rate.value())
        .bind(rate.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}
