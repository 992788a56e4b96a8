//! Snapshot storage port — durable key-value storage for persisted state branches.

use std::future::Future;

use homedash_domain::error::HomeDashError;

/// Durable key-value storage holding JSON snapshots.
///
/// Only the state store writes through this port; keys are namespaced by it.
pub trait SnapshotStore {
    /// Read the snapshot stored under `key`.
    fn load(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, HomeDashError>> + Send;

    /// Store (or overwrite) the snapshot under `key`.
    fn save(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), HomeDashError>> + Send;

    /// Delete the snapshot under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), HomeDashError>> + Send;

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> impl Future<Output = Result<Vec<String>, HomeDashError>> + Send;
}

impl<T: SnapshotStore + Send + Sync> SnapshotStore for std::sync::Arc<T> {
    fn load(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, HomeDashError>> + Send {
        (**self).load(key)
    }

    fn save(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), HomeDashError>> + Send {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), HomeDashError>> + Send {
        (**self).remove(key)
    }

    fn keys(&self) -> impl Future<Output = Result<Vec<String>, HomeDashError>> + Send {
        (**self).keys()
    }
}
