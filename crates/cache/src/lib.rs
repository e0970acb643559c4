#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;
pub mod store;

pub use client::RedisHistory;
pub use local::LocalHistory;
pub use store::{CpcHistoryStore, HistoryBackend, WindowAverage};
