use async_trait::async_trait;
use time::{Date, PrimitiveDateTime};

use crate::domain::Reading;

pub mod memory;
pub mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

/// A store failure is always surfaced as an error for the request that hit
/// it. It is never folded into "no data": an empty result and a failed read
/// must stay distinguishable to callers.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append-only collection of balance readings.
///
/// All timestamps are naive civil datetimes in the monitor's fixed UTC+8
/// calendar; the store never sees an offset. Range queries are half-open
/// `[start, end)` and always ordered by timestamp.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError>;

    async fn insert_batch(&self, readings: &[Reading]) -> Result<(), StoreError>;

    /// Readings in `[start, end)`. `meter_id = None` spans every meter.
    async fn query_range(
        &self,
        meter_id: Option<&str>,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<Reading>, StoreError>;

    /// Most recent reading strictly before `ts`.
    async fn latest_before(
        &self,
        meter_id: &str,
        ts: PrimitiveDateTime,
    ) -> Result<Option<Reading>, StoreError>;

    /// Most recent reading overall.
    async fn latest(&self, meter_id: &str) -> Result<Option<Reading>, StoreError>;

    /// Last reading on the given civil day.
    async fn latest_on_date(
        &self,
        meter_id: &str,
        date: Date,
    ) -> Result<Option<Reading>, StoreError>;
}
