//! Photo list synchronization.
//!
//! - `sort` - total ordering of photo records by a configurable field
//! - `diff` - identity-based comparison of two snapshots
//! - `result_cache` - short-lived replay of the last listing
//! - `engine` - the polling loop that fetches, sorts and publishes snapshots

pub mod diff;
pub mod engine;
pub mod result_cache;
pub mod sort;

#[cfg(test)]
pub mod testing;

pub use diff::SnapshotDiff;
pub use engine::*;
