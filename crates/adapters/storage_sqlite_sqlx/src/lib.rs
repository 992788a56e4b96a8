//! # homedash-adapter-storage-sqlite-sqlx
//!
//! `SQLite` snapshot storage using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `SnapshotStore` port defined in `homedash-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//!
//! ## Dependency rule
//! Depends on `homedash-app` (for port traits) and `homedash-domain` (for error types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod snapshot_store;

pub use error::StorageError;
pub use pool::{Config, Database};
pub use snapshot_store::SqliteSnapshotStore;
