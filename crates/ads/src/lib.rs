#![warn(clippy::unwrap_used)]

pub mod clients;
pub mod google;
pub mod query;
pub mod rows;

pub use clients::{AdsPlatformClient, FieldUpdate, LocalServicesClient, LocalServicesDay, LocalServicesFeed, MutateAck};
pub use google::GoogleAdsClient;
