//! Shared application state for axum handlers.

use std::sync::Arc;

use homedash_app::connection_monitor::ConnectionMonitor;
use homedash_app::context::AppContext;
use homedash_app::event_bus::EventBus;
use homedash_app::poller::Poller;
use homedash_app::state::StateStore;

/// Core services shared across all axum handlers.
///
/// Only the `Arc` handles are cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub store: Arc<StateStore>,
    pub poller: Arc<Poller>,
    pub monitor: Arc<ConnectionMonitor>,
}

impl AppState {
    /// Take handles to the services wired in `context`.
    #[must_use]
    pub fn new(context: &AppContext) -> Self {
        Self {
            bus: context.bus(),
            store: context.store(),
            poller: context.poller(),
            monitor: context.monitor(),
        }
    }
}

impl From<&AppContext> for AppState {
    fn from(context: &AppContext) -> Self {
        Self::new(context)
    }
}
