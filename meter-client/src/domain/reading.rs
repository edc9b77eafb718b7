use time::PrimitiveDateTime;

/// One observed remaining-credit value for a meter at a point in time.
///
/// Readings are append-only and write-once; timestamps are naive civil
/// datetimes in the monitor's fixed UTC+8 calendar (see [`super::civil`]).
/// Duplicate timestamps are possible and tolerated downstream.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    pub ts: PrimitiveDateTime,
    pub meter_id: String,
    pub balance: f64,
}
