//! Database module: SQL repositories, row models and the outbox `Store`.
//!
//! - `model`: raw row shapes and their conversion into domain types.
//! - `repo`: SQL-only functions over a `SqlitePool`.
//! - `store`: the change-notifying handle the sync core works through.
//!
//! The repository API is re-exported at `lms_sync::db::*`.

pub mod model;
pub mod repo;
pub mod store;

pub use repo::*;

pub use model::StatusCounts;
pub use store::Store;
