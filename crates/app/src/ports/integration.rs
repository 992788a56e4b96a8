//! Integration port — lifecycle of a device integration plugged into the core.
//!
//! An integration bridges an external device family (lights, audio, plugs,
//! thermostat, …) into the dashboard. It registers itself in the registry,
//! schedules its polling through the poller, writes what it observes into
//! the state store and talks to other components over the event bus.

use std::future::Future;

use homedash_domain::error::HomeDashError;

use crate::context::AppContext;

/// A pluggable device integration.
///
/// The binary crate calls the lifecycle methods in order:
///
/// 1. [`setup`](Self::setup) — register services, subscriptions and poller tasks
/// 2. (the core runs; the integration reacts to its own timers and bus events)
/// 3. [`teardown`](Self::teardown) — unregister tasks and drop subscriptions
pub trait Integration {
    /// Unique name identifying this integration (e.g. `"virtual"`).
    fn name(&self) -> &'static str;

    /// Wire the integration into the core.
    ///
    /// Must not block on device discovery; slow work belongs in a poller
    /// task registered here.
    fn setup(&mut self, ctx: &AppContext) -> impl Future<Output = Result<(), HomeDashError>> + Send;

    /// Called on graceful shutdown.
    fn teardown(&mut self, ctx: &AppContext) -> impl Future<Output = Result<(), HomeDashError>> + Send;
}
