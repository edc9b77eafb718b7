pub mod meter_page;

pub use meter_page::{MeterPollSource, MeterScraper};
