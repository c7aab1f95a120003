//! Read-through cache for the integrations view.
//!
//! - [`freshness`] decides whether a snapshot needs a background refresh
//! - [`snapshot`] holds the cached view and reads/writes it as a whole

pub mod freshness;
pub mod snapshot;

pub use freshness::{CacheSource, FreshnessPolicy};
pub use snapshot::{CacheSnapshot, SnapshotStore};
