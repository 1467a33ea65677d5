//! Canopy: an in-memory, journaled, path-addressable tree store.
//!
//! Values are deduplicated by content: one node per distinct value, appearing
//! as a child at arbitrarily many tree positions. Clients address data with
//! ordered token paths (`*` matches every current child). Every mutation is
//! appended to a per-database journal before the operation completes, and a
//! database is rebuilt from its journal on first use.

#![warn(missing_docs)]

pub mod client;
pub mod db;
pub mod error;
pub mod journal;
pub mod model;
pub mod server;
pub mod store;

pub use db::{Database, DatabasePool, GetResult, PoolConfig, UseOutcome};
pub use error::{Result, StoreError};
