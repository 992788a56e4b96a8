//! Capability — the symbolic key a shared service is registered under.
//!
//! The set of core capabilities is closed; device integrations are named
//! through [`Capability::Integration`].

use std::fmt;

/// Symbolic key identifying a service in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// The publish/subscribe event bus.
    EventBus,
    /// The centralized state store.
    StateStore,
    /// The recurring-task scheduler.
    Poller,
    /// The connectivity-health monitor.
    ConnectionMonitor,
    /// A device integration or API client, named by the integration.
    Integration(&'static str),
}

impl Capability {
    /// The string form used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventBus => "eventBus",
            Self::StateStore => "stateStore",
            Self::Poller => "poller",
            Self::ConnectionMonitor => "connectionMonitor",
            Self::Integration(name) => name,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_core_capabilities_in_camel_case() {
        assert_eq!(Capability::EventBus.to_string(), "eventBus");
        assert_eq!(Capability::StateStore.to_string(), "stateStore");
        assert_eq!(Capability::ConnectionMonitor.to_string(), "connectionMonitor");
    }

    #[test]
    fn should_display_integration_by_name() {
        assert_eq!(Capability::Integration("hueApi").to_string(), "hueApi");
    }

    #[test]
    fn should_distinguish_integrations_by_name() {
        assert_ne!(
            Capability::Integration("hue"),
            Capability::Integration("sonos")
        );
    }
}
