//! Reachability tracking for the backends the dashboard depends on.
//!
//! Each monitored service is paired with a [`Probe`]. A check marks the
//! service as checking, runs the probe under a deadline and records the
//! outcome both internally and at `connections.<name>` in the state store.
//! Only an online/offline flip is announced on the bus.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::time::Instant;

use homedash_domain::connection::{ConnectionStatus, MonitoredService};
use homedash_domain::error::{PollerError, ProbeError};
use homedash_domain::time::now;
use homedash_domain::topic;

use crate::event_bus::EventBus;
use crate::poller::{Poller, TaskOptions};
use crate::ports::Probe;
use crate::state::{SetOptions, StateStore};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Poller task name used by [`ConnectionMonitor::schedule`].
pub const TASK_NAME: &str = "connection-monitor";

/// State branch holding one status record per service.
const STATE_BRANCH: &str = "connections";

/// A service and the probe that checks it.
#[derive(Clone)]
pub struct Monitored {
    pub service: MonitoredService,
    pub probe: Arc<dyn Probe>,
}

impl Monitored {
    pub fn new(service: MonitoredService, probe: impl Probe + 'static) -> Self {
        Self {
            service,
            probe: Arc::new(probe),
        }
    }
}

impl std::fmt::Debug for Monitored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitored")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Retry policy for [`ConnectionMonitor::wait_for_connections`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub max_attempts: u32,
    pub retry_interval: Duration,
    /// Overall deadline; zero means none.
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct ConnectionMonitor {
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    services: Vec<Monitored>,
    statuses: Mutex<BTreeMap<String, ConnectionStatus>>,
    probe_timeout: Duration,
    /// Held for the duration of a sweep.
    sweep_lock: tokio::sync::Mutex<()>,
}

impl ConnectionMonitor {
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        store: Arc<StateStore>,
        probe_timeout: Duration,
        services: Vec<Monitored>,
    ) -> Self {
        let statuses: BTreeMap<String, ConnectionStatus> = services
            .iter()
            .map(|monitored| (monitored.service.name.clone(), ConnectionStatus::default()))
            .collect();
        let monitor = Self {
            bus,
            store,
            services,
            statuses: Mutex::new(statuses),
            probe_timeout,
            sweep_lock: tokio::sync::Mutex::new(()),
        };
        for (name, status) in monitor.get_status() {
            monitor.publish(&name, &status, SetOptions::silent());
        }
        monitor
    }

    /// Probe one service. Returns `None` if it is not monitored.
    pub async fn check(&self, service: &str) -> Option<ConnectionStatus> {
        let monitored = self
            .services
            .iter()
            .find(|monitored| monitored.service.name == service)?;
        Some(self.check_one(monitored, None).await)
    }

    /// Probe every service concurrently and return the resulting snapshot.
    ///
    /// While a sweep is running, further calls return the last-known
    /// snapshot without probing.
    pub async fn check_all(&self) -> BTreeMap<String, ConnectionStatus> {
        let Ok(_sweep) = self.sweep_lock.try_lock() else {
            tracing::debug!("connection sweep already running, returning last snapshot");
            return self.get_status();
        };
        self.sweep(None).await
    }

    /// Sweep until every service is online, `max_attempts` sweeps have
    /// run, or the deadline passes. Never fails; the final snapshot is
    /// returned either way.
    ///
    /// An attempt that finds a sweep in flight waits for it to finish and
    /// then sweeps itself. Probes are cut short at the deadline, so every
    /// service ends up with a recorded outcome.
    pub async fn wait_for_connections(&self, options: WaitOptions) -> BTreeMap<String, ConnectionStatus> {
        let deadline = (!options.timeout.is_zero()).then(|| Instant::now() + options.timeout);
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let guard = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.sweep_lock.lock()).await {
                    Ok(guard) => guard,
                    Err(_) => {
                        tracing::warn!(attempt, "timed out waiting for running connection sweep");
                        break;
                    }
                },
                None => self.sweep_lock.lock().await,
            };
            let statuses = self.sweep(deadline).await;
            drop(guard);

            if statuses.values().all(|status| status.online) {
                tracing::info!(attempt, services = statuses.len(), "all services online");
                return statuses;
            }
            if attempt >= max_attempts {
                break;
            }
            let wake = Instant::now() + options.retry_interval;
            match deadline {
                Some(deadline) if wake >= deadline => {
                    tracing::warn!(attempt, "deadline reached before next connection attempt");
                    break;
                }
                _ => tokio::time::sleep_until(wake).await,
            }
        }

        let statuses = self.get_status();
        let offline: Vec<&str> = statuses
            .iter()
            .filter(|(_, status)| !status.online)
            .map(|(name, _)| name.as_str())
            .collect();
        tracing::warn!(attempts = attempt, offline = ?offline, "continuing with services offline");
        statuses
    }

    /// Register the periodic sweep as a guarded poller task.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::InvalidInterval`] for a zero interval.
    pub fn schedule(self: &Arc<Self>, poller: &Poller, interval: Duration) -> Result<(), PollerError> {
        let monitor = Arc::clone(self);
        poller.register(TASK_NAME, interval, TaskOptions::default(), move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.check_all().await;
                Ok(())
            }
        })
    }

    #[must_use]
    pub fn is_online(&self, service: &str) -> bool {
        self.lock_statuses()
            .get(service)
            .is_some_and(|status| status.online)
    }

    /// Last-known status of every service, keyed by name.
    #[must_use]
    pub fn get_status(&self) -> BTreeMap<String, ConnectionStatus> {
        self.lock_statuses().clone()
    }

    #[must_use]
    pub fn get_error_message(&self, service: &str) -> Option<String> {
        self.lock_statuses()
            .get(service)
            .and_then(|status| status.error.clone())
    }

    /// Names of the monitored services, in configuration order.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|monitored| monitored.service.name.clone())
            .collect()
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.lock_statuses()
            .values()
            .filter(|status| status.online)
            .count()
    }

    /// Run every probe concurrently. Callers hold `sweep_lock`.
    async fn sweep(&self, deadline: Option<Instant>) -> BTreeMap<String, ConnectionStatus> {
        join_all(
            self.services
                .iter()
                .map(|monitored| self.check_one(monitored, deadline)),
        )
        .await;
        self.get_status()
    }

    async fn check_one(&self, monitored: &Monitored, deadline: Option<Instant>) -> ConnectionStatus {
        let name = monitored.service.name.as_str();
        let checking = self.modify(name, ConnectionStatus::begin_check);
        self.publish(name, &checking, SetOptions::default());

        // Bounded by whichever comes first: the probe timeout or the deadline.
        let limit = deadline.map_or(self.probe_timeout, |deadline| {
            self.probe_timeout
                .min(deadline.saturating_duration_since(Instant::now()))
        });
        let outcome = tokio::time::timeout(limit, monitored.probe.check())
            .await
            .unwrap_or(Err(ProbeError::Timeout(limit)));

        let mut flipped = false;
        let status = self.modify(name, |status| flipped = status.apply(&outcome, now()));
        self.publish(name, &status, SetOptions::default());

        if flipped {
            self.announce(name, &status);
        } else if let Err(err) = &outcome {
            tracing::debug!(service = name, error = %err, "service still offline");
        }
        status
    }

    fn announce(&self, name: &str, status: &ConnectionStatus) {
        let topic = if status.online {
            tracing::info!(service = name, "service online");
            topic::connection_online(name)
        } else {
            tracing::warn!(
                service = name,
                error = status.error.as_deref().unwrap_or_default(),
                "service offline"
            );
            topic::connection_offline(name)
        };
        self.bus.emit(
            &topic,
            json!({
                "service": name,
                "online": status.online,
                "error": status.error,
                "lastCheck": status.last_check,
            }),
        );
    }

    fn publish(&self, name: &str, status: &ConnectionStatus, options: SetOptions) {
        let value = match serde_json::to_value(status) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(service = name, error = %err, "failed to encode connection status");
                return;
            }
        };
        if let Err(err) = self.store.set(&format!("{STATE_BRANCH}.{name}"), value, options) {
            tracing::warn!(service = name, error = %err, "failed to store connection status");
        }
    }

    fn modify(&self, name: &str, apply: impl FnOnce(&mut ConnectionStatus)) -> ConnectionStatus {
        let mut statuses = self.lock_statuses();
        let status = statuses.entry(name.to_string()).or_default();
        apply(status);
        status.clone()
    }

    fn lock_statuses(&self) -> MutexGuard<'_, BTreeMap<String, ConnectionStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
