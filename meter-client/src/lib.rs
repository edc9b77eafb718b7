pub mod db;
pub mod domain;
pub mod usage;

pub use db::{MemoryReadingStore, PgReadingStore, ReadingStore, StoreError};
pub use domain::{Reading, RechargeEvent};
pub use usage::aggregator::{
    KpiReport, Period, PeriodAggregator, PeriodComparison, StatisticsSeries,
};
