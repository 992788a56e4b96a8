//! In-memory stand-ins for the ports, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homedash_domain::connection::ProbeReport;
use homedash_domain::error::{HomeDashError, ProbeError};

use crate::ports::{Probe, ProbeFuture, SnapshotStore};

#[derive(Debug, Default, Clone)]
pub struct MemorySnapshots {
    pub entries: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl MemorySnapshots {
    pub fn with(entries: &[(&str, serde_json::Value)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.entries.lock().unwrap();
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

impl SnapshotStore for MemorySnapshots {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, HomeDashError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), HomeDashError> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HomeDashError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, HomeDashError> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}

/// A probe that answers from a switchable flag after an optional delay.
#[derive(Debug, Clone, Default)]
pub struct StubProbe {
    pub online: Arc<std::sync::atomic::AtomicBool>,
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl StubProbe {
    pub fn online() -> Self {
        let probe = Self::default();
        probe.set_online(true);
        probe
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::online()
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for StubProbe {
    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.online.load(Ordering::SeqCst) {
                Ok(ProbeReport::default().with("version", "1.0"))
            } else {
                Err(ProbeError::Unreachable("connection refused".to_string()))
            }
        })
    }
}
