//! Common error types used across the workspace.
//!
//! Each component has its own typed error; [`HomeDashError`] collects them
//! via `#[from]` so callers crossing component boundaries can use `?`.

use std::fmt;
use std::time::Duration;

use crate::capability::Capability;

/// Top-level error for the homedash workspace.
#[derive(Debug, thiserror::Error)]
pub enum HomeDashError {
    #[error("registry error")]
    Registry(#[from] RegistryError),

    #[error("event bus error")]
    Bus(#[from] BusError),

    #[error("state error")]
    State(#[from] StateError),

    #[error("poller error")]
    Poller(#[from] PollerError),

    #[error("probe failure")]
    Probe(#[from] ProbeError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by service registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The key was never registered.
    #[error("service {key} is not registered")]
    NotRegistered { key: Capability },

    /// Resolving a factory re-entered resolution of a key already on the stack.
    #[error("circular dependency detected: {}", CyclePath(path))]
    CircularDependency { path: Vec<Capability> },

    /// A synchronous accessor was used on an asynchronous factory.
    #[error("service {key} has an async factory, use get_async")]
    AsyncFactoryMisuse { key: Capability },

    /// The stored instance does not have the type requested by the key.
    #[error("service {key} is registered with a different type")]
    TypeMismatch { key: Capability },
}

struct CyclePath<'a>(&'a [Capability]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, key) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// Errors raised by the event bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The subscription topic cannot be matched by any emit.
    #[error("invalid listener topic {topic:?}")]
    InvalidListener { topic: String },

    /// A `wait_for` / `request` deadline elapsed.
    #[error("timed out after {timeout:?} waiting for {topic}")]
    Timeout { topic: String, timeout: Duration },
}

/// Errors raised by state store writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The dotted path is empty or contains an empty segment.
    #[error("invalid state path {0:?}")]
    InvalidPath(String),
}

/// Errors raised by the task scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollerError {
    /// No task is registered under this name.
    #[error("no task named {0}")]
    UnknownTask(String),

    /// Intervals must be strictly positive.
    #[error("task {0} needs a non-zero interval")]
    InvalidInterval(String),
}

/// Why a connection probe could not confirm its target is reachable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The probe did not answer within its deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The target could not be reached at all.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The target answered but refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The target answered with something that is not a health report.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The service lacks the configuration needed to probe it.
    #[error("not configured: {0}")]
    NotConfigured(String),
}
