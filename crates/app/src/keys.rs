//! Well-known registry keys for the core services.

use homedash_domain::capability::Capability;

use crate::connection_monitor::ConnectionMonitor;
use crate::event_bus::EventBus;
use crate::poller::Poller;
use crate::registry::ServiceKey;
use crate::state::StateStore;

pub const EVENT_BUS: ServiceKey<EventBus> = ServiceKey::new(Capability::EventBus);

pub const STATE_STORE: ServiceKey<StateStore> = ServiceKey::new(Capability::StateStore);

pub const POLLER: ServiceKey<Poller> = ServiceKey::new(Capability::Poller);

pub const CONNECTION_MONITOR: ServiceKey<ConnectionMonitor> =
    ServiceKey::new(Capability::ConnectionMonitor);

/// Key for an integration's own service type.
#[must_use]
pub const fn integration<T>(name: &'static str) -> ServiceKey<T> {
    ServiceKey::new(Capability::Integration(name))
}
