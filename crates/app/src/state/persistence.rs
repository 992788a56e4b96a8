//! Write-behind persistence of allow-listed state branches.
//!
//! State store writes are synchronous while [`SnapshotStore`] is async, so
//! writes are queued on a channel and applied in order by a background task
//! that owns the storage.

use tokio::sync::{mpsc, oneshot};

use crate::ports::SnapshotStore;

/// Namespace prepended to every top-level key in durable storage.
pub const STORAGE_PREFIX: &str = "homedash:";

/// Bare keys written by earlier dashboard versions and the top-level key
/// that replaced each of them.
pub const LEGACY_KEYS: &[(&str, &str)] = &[
    ("tempHistory", "temperatureHistory"),
    ("motionEvents", "motionHistory"),
    ("widgetPositions", "uiPositions"),
];

/// Storage key for a top-level state key.
#[must_use]
pub fn storage_key(top_level: &str) -> String {
    format!("{STORAGE_PREFIX}{top_level}")
}

#[derive(Debug)]
pub(crate) enum PersistCommand {
    Save {
        key: String,
        value: serde_json::Value,
    },
    Remove {
        key: String,
    },
    Clear,
    Flush(oneshot::Sender<()>),
}

impl PersistCommand {
    /// Top-level key a save or remove targets.
    pub(crate) fn key(&self) -> Option<&str> {
        match self {
            Self::Save { key, .. } | Self::Remove { key } => Some(key),
            Self::Clear | Self::Flush(_) => None,
        }
    }
}

pub(crate) async fn run<S: SnapshotStore>(
    storage: S,
    mut commands: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = commands.recv().await {
        apply(&storage, command).await;
    }
    tracing::debug!("state persister stopped");
}

pub(crate) async fn apply<S: SnapshotStore>(storage: &S, command: PersistCommand) {
    match command {
        PersistCommand::Save { key, value } => {
            if let Err(err) = storage.save(&storage_key(&key), value).await {
                tracing::warn!(key = %key, error = %err, "failed to persist state snapshot");
            }
        }
        PersistCommand::Remove { key } => {
            if let Err(err) = storage.remove(&storage_key(&key)).await {
                tracing::warn!(key = %key, error = %err, "failed to remove state snapshot");
            }
        }
        PersistCommand::Clear => clear(storage).await,
        PersistCommand::Flush(done) => {
            let _ = done.send(());
        }
    }
}

async fn clear<S: SnapshotStore>(storage: &S) {
    let keys = match storage.keys().await {
        Ok(keys) => keys,
        Err(err) => {
            tracing::warn!(error = %err, "failed to list state snapshots");
            return;
        }
    };
    for key in keys.iter().filter(|key| key.starts_with(STORAGE_PREFIX)) {
        if let Err(err) = storage.remove(key).await {
            tracing::warn!(key = %key, error = %err, "failed to remove state snapshot");
        }
    }
}

/// Move legacy snapshots to their namespaced keys.
///
/// A legacy key is only migrated when its replacement is persisted and
/// not already present; it is deleted either way once read. Returns the
/// top-level keys that received migrated data.
pub(crate) async fn migrate_legacy<S: SnapshotStore>(storage: &S, persisted: &[String]) -> Vec<String> {
    let mut migrated = Vec::new();
    for (legacy, current) in LEGACY_KEYS {
        if !persisted.iter().any(|key| key == current) {
            continue;
        }
        let value = match storage.load(legacy).await {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(key = legacy, error = %err, "failed to read legacy snapshot");
                continue;
            }
        };
        let target = storage_key(current);
        match storage.load(&target).await {
            Ok(None) => {
                if let Err(err) = storage.save(&target, value).await {
                    tracing::warn!(key = legacy, error = %err, "failed to migrate legacy snapshot");
                    continue;
                }
                tracing::info!(from = legacy, to = current, "migrated legacy snapshot");
                migrated.push((*current).to_string());
            }
            Ok(Some(_)) => {
                tracing::debug!(key = legacy, "newer snapshot exists, dropping legacy one");
            }
            Err(err) => {
                tracing::warn!(key = %target, error = %err, "failed to read snapshot");
                continue;
            }
        }
        if let Err(err) = storage.remove(legacy).await {
            tracing::warn!(key = legacy, error = %err, "failed to delete legacy snapshot");
        }
    }
    migrated
}
