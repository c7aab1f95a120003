//! Local persistence for cached integrations, preferences and the session token.

mod kv;
mod state;

pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
pub use state::{PersistedState, StateKey};
