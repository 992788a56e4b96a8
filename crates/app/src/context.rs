//! Application context — the one place the core services are wired together.
//!
//! The context owns a [`Registry`]. Bootstrapping registers the event bus
//! and poller as ready instances and the state store and connection
//! monitor as factories that pull their own dependencies from the
//! registry, then resolves everything once so the accessors cannot fail.

use std::sync::Arc;
use std::time::Duration;

use homedash_domain::error::RegistryError;

use crate::connection_monitor::{ConnectionMonitor, DEFAULT_PROBE_TIMEOUT, Monitored};
use crate::event_bus::{self, EventBus};
use crate::keys;
use crate::poller::Poller;
use crate::registry::Registry;
use crate::state::{StateConfig, StateStore};

/// Everything the core needs to build its services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub bus_history_limit: usize,
    pub state: StateConfig,
    pub probe_timeout: Duration,
    pub services: Vec<Monitored>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bus_history_limit: event_bus::DEFAULT_HISTORY_LIMIT,
            state: StateConfig::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            services: Vec::new(),
        }
    }
}

/// Handle to the wired core services.
///
/// Cheap to clone; clones share the same registry and services.
#[derive(Clone)]
pub struct AppContext {
    registry: Registry,
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    poller: Arc<Poller>,
    monitor: Arc<ConnectionMonitor>,
}

impl AppContext {
    /// Register and resolve the core services in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns the [`RegistryError`] of the first service that fails to
    /// resolve.
    pub fn bootstrap(config: CoreConfig) -> Result<Self, RegistryError> {
        Self::bootstrap_in(Registry::new(), config)
    }

    /// Like [`bootstrap`](Self::bootstrap), but into an existing registry.
    ///
    /// Services already resolved there (for example test doubles) are kept.
    ///
    /// # Errors
    ///
    /// Returns the [`RegistryError`] of the first service that fails to
    /// resolve.
    pub fn bootstrap_in(registry: Registry, config: CoreConfig) -> Result<Self, RegistryError> {
        let CoreConfig {
            bus_history_limit,
            state,
            probe_timeout,
            services,
        } = config;

        let bus = EventBus::install(&registry, bus_history_limit);
        registry.register_instance(keys::POLLER, Arc::new(Poller::new()));
        registry.register_factory(keys::STATE_STORE, move |registry| {
            let bus = registry.get(keys::EVENT_BUS)?;
            Ok(Arc::new(StateStore::new(bus, state.clone())))
        });
        registry.register_factory(keys::CONNECTION_MONITOR, move |registry| {
            let bus = registry.get(keys::EVENT_BUS)?;
            let store = registry.get(keys::STATE_STORE)?;
            Ok(Arc::new(ConnectionMonitor::new(
                bus,
                store,
                probe_timeout,
                services.clone(),
            )))
        });

        let monitor = registry.get(keys::CONNECTION_MONITOR)?;
        let context = Self {
            bus,
            store: registry.get(keys::STATE_STORE)?,
            poller: registry.get(keys::POLLER)?,
            monitor,
            registry,
        };
        tracing::debug!(services = ?context.registry.keys(), "core services bootstrapped");
        Ok(context)
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    #[must_use]
    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn poller(&self) -> Arc<Poller> {
        Arc::clone(&self.poller)
    }

    #[must_use]
    pub fn monitor(&self) -> Arc<ConnectionMonitor> {
        Arc::clone(&self.monitor)
    }
}
