#![warn(clippy::unwrap_used)]

pub mod trend;

pub use trend::{classify, CampaignTrend, TrendCalculator};
