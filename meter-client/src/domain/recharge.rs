use time::PrimitiveDateTime;

/// A reconstructed top-up, inferred from an upward jump between two adjacent
/// readings. Never persisted; recomputed from the reading history on every
/// query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RechargeEvent {
    /// Timestamp of the first reading observed after the top-up.
    pub ts: PrimitiveDateTime,
    pub meter_id: String,
    /// Estimated top-up amount, rounded to the vendor's denomination.
    pub amount: i64,
    pub balance_before: f64,
    pub balance_after: f64,
}
