use std::sync::Mutex;

use async_trait::async_trait;
use time::{Date, PrimitiveDateTime};

use super::{ReadingStore, StoreError};
use crate::domain::{civil, Reading};

/// In-memory [`ReadingStore`] backing the engine and API tests.
///
/// Keeps readings sorted by timestamp (stable, so duplicate timestamps keep
/// their arrival order) to mirror the ordering contract of the Postgres
/// implementation.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    readings: Mutex<Vec<Reading>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(readings: Vec<Reading>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.readings.lock().expect("reading store lock poisoned");
            guard.extend(readings);
            guard.sort_by_key(|r| r.ts);
        }
        store
    }

    fn snapshot(&self) -> Vec<Reading> {
        self.readings
            .lock()
            .expect("reading store lock poisoned")
            .clone()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        let mut guard = self.readings.lock().expect("reading store lock poisoned");
        guard.push(reading.clone());
        guard.sort_by_key(|r| r.ts);
        Ok(())
    }

    async fn insert_batch(&self, readings: &[Reading]) -> Result<(), StoreError> {
        let mut guard = self.readings.lock().expect("reading store lock poisoned");
        guard.extend_from_slice(readings);
        guard.sort_by_key(|r| r.ts);
        Ok(())
    }

    async fn query_range(
        &self,
        meter_id: Option<&str>,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|r| r.ts >= start && r.ts < end)
            .filter(|r| meter_id.is_none_or(|m| r.meter_id == m))
            .collect())
    }

    async fn latest_before(
        &self,
        meter_id: &str,
        ts: PrimitiveDateTime,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .snapshot()
            .into_iter()
            .rev()
            .find(|r| r.meter_id == meter_id && r.ts < ts))
    }

    async fn latest(&self, meter_id: &str) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .snapshot()
            .into_iter()
            .rev()
            .find(|r| r.meter_id == meter_id))
    }

    async fn latest_on_date(
        &self,
        meter_id: &str,
        date: Date,
    ) -> Result<Option<Reading>, StoreError> {
        let start = civil::day_start(date);
        let end = civil::day_end(date);
        Ok(self
            .snapshot()
            .into_iter()
            .rev()
            .find(|r| r.meter_id == meter_id && r.ts >= start && r.ts < end))
    }
}
