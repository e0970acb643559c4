#![warn(clippy::unwrap_used)]

pub mod config;
pub mod conversation;
pub mod error;
pub mod strategy;
pub mod types;

pub use config::AppConfig;
pub use conversation::ConversationEstimator;
pub use error::{CampaignError, CampaignResult};
pub use strategy::{BiddingStrategy, StrategyFields, TargetField, TargetSlot};
