//! # homedash-app
//!
//! Reactive application core of the dashboard.
//!
//! ## Responsibilities
//! - [`registry`] — capability-keyed service lookup with lazy factories and
//!   circular-dependency detection
//! - [`event_bus`] — in-process publish/subscribe with wildcards, history
//!   and request/response helpers
//! - [`state`] — the single JSON state tree, its change notifications and
//!   write-behind persistence of selected branches
//! - [`poller`] — named recurring tasks with overlap protection
//! - [`connection_monitor`] — reachability of backend services
//! - [`context`] — bootstrap of all of the above into one registry
//! - [`ports`] — traits adapters implement (snapshot storage, probes,
//!   integrations)
//!
//! ## Dependency rule
//! Depends on `homedash-domain` only (plus tokio and futures for timers and
//! channels). Never imports adapter crates.

pub mod connection_monitor;
pub mod context;
pub mod event_bus;
pub mod keys;
pub mod poller;
pub mod ports;
pub mod registry;
pub mod state;

#[cfg(test)]
mod test_support;
