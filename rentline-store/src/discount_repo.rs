use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentline_catalog::{DiscountCatalog, DiscountCode};
use rentline_core::StoreError;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;

use crate::database::backend;

#[derive(sqlx::FromRow)]
struct DiscountRow {
    code: String,
    name: String,
    kind: String,
    value: Decimal,
    min_booking_amount: Option<Decimal>,
    max_uses: Option<i32>,
    used_count: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = StoreError;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        Ok(DiscountCode {
            code: row.code,
            name: row.name,
            kind: row.kind.parse().map_err(StoreError::Backend)?,
            value: row.value,
            min_booking_amount: row.min_booking_amount,
            max_uses: row.max_uses,
            used_count: row.used_count,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
        })
    }
}

pub struct PgDiscountCatalog {
    pool: PgPool,
}

impl PgDiscountCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountCatalog for PgDiscountCatalog {
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        let row = sqlx::query_as::<_, DiscountRow>(
            "SELECT code, name, kind, value, min_booking_amount, max_uses, used_count,
                    valid_from, valid_until, is_active
             FROM discount_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(DiscountCode::try_from).transpose()
    }

    async fn redeem(&self, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE discount_codes SET used_count = used_count + 1
             WHERE code = $1 AND (max_uses IS NULL OR used_count < max_uses)",
        )
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT code FROM discount_codes WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
            return match exists {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound(format!("discount code {}", code))),
            };
        }
        debug!("Discount code {} redeemed", code);
        Ok(true)
    }

    async fn restore(&self, code: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE discount_codes SET used_count = GREATEST(used_count - 1, 0) WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        debug!("Discount code {} use restored", code);
        Ok(())
    }
}
