#![warn(clippy::unwrap_used)]

pub mod aggregator;
pub mod mutation;
pub mod service;
pub mod state;

pub use aggregator::{AccountFailure, AggregateOutcome, CampaignAggregator};
pub use mutation::{MutationOrchestrator, MutationReceipt};
pub use service::DashboardService;
pub use state::{CycleTicket, DashboardSnapshot, DashboardState};
