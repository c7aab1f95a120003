pub mod aggregator;
pub mod api_types;
pub mod client;
pub mod types;

pub use aggregator::{AggregateResult, FetchAggregator};
pub use client::ApiClient;
