use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use super::{ReadingStore, StoreError};
use crate::domain::{civil, Reading};

/// Postgres-backed reading store.
///
/// Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO balance_readings (ts, meter_id, balance) VALUES ($1, $2, $3)")
            .bind(reading.ts)
            .bind(&reading.meter_id)
            .bind(reading.balance)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_batch(&self, readings: &[Reading]) -> Result<(), StoreError> {
        if readings.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO balance_readings (ts, meter_id, balance) ",
        );
        builder.push_values(readings, |mut b, r| {
            b.push_bind(r.ts).push_bind(&r.meter_id).push_bind(r.balance);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn query_range(
        &self,
        meter_id: Option<&str>,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        let rows = match meter_id {
            Some(meter) => {
                sqlx::query_as::<_, Reading>(
                    r#"
                    SELECT ts, meter_id, balance
                    FROM balance_readings
                    WHERE meter_id = $1
                      AND ts >= $2
                      AND ts <  $3
                    ORDER BY ts
                    "#,
                )
                .bind(meter)
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Reading>(
                    r#"
                    SELECT ts, meter_id, balance
                    FROM balance_readings
                    WHERE ts >= $1
                      AND ts <  $2
                    ORDER BY ts
                    "#,
                )
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    async fn latest_before(
        &self,
        meter_id: &str,
        ts: PrimitiveDateTime,
    ) -> Result<Option<Reading>, StoreError> {
        let row = sqlx::query_as::<_, Reading>(
            r#"
            SELECT ts, meter_id, balance
            FROM balance_readings
            WHERE meter_id = $1
              AND ts < $2
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(meter_id)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn latest(&self, meter_id: &str) -> Result<Option<Reading>, StoreError> {
        let row = sqlx::query_as::<_, Reading>(
            r#"
            SELECT ts, meter_id, balance
            FROM balance_readings
            WHERE meter_id = $1
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(meter_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn latest_on_date(
        &self,
        meter_id: &str,
        date: Date,
    ) -> Result<Option<Reading>, StoreError> {
        // Day bounds instead of a DATE() projection so the (meter_id, ts)
        // index stays usable.
        self.latest_before(meter_id, civil::day_end(date))
            .await
            .map(|row| row.filter(|r| r.ts >= civil::day_start(date)))
    }
}
