#![warn(clippy::unwrap_used)]

pub mod cache;
pub mod client;
pub mod local;
pub mod tracker;

pub use cache::VisitCache;
pub use client::RedisVisitStore;
pub use local::LocalVisitStore;
pub use tracker::{FirstVisit, VisitTracker};
