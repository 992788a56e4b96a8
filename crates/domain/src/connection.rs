//! Connection status — last-known reachability of a monitored backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProbeError;
use crate::time::Timestamp;

/// What sort of backend a monitored service is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Local hardware bridge on the LAN (e.g. the Hue bridge).
    Bridge,
    /// A backend proxy process fronting a device family.
    Proxy,
    /// Cloud thermostat integration.
    Thermostat,
}

/// A service watched by the connection monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitoredService {
    pub name: String,
    pub kind: ServiceKind,
}

impl MonitoredService {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Metadata a successful probe reports about its target (name, version, uptime, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub details: Map<String, Value>,
}

impl ProbeReport {
    /// Add one metadata field, skipping nulls.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.details.insert(key.to_string(), value);
        }
        self
    }
}

/// Last-known status of one monitored service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub online: bool,
    pub checking: bool,
    pub last_check: Option<Timestamp>,
    pub error: Option<String>,
    pub details: Map<String, Value>,
}

impl ConnectionStatus {
    /// Mark a probe as in flight; the online flag keeps its last value.
    pub fn begin_check(&mut self) {
        self.checking = true;
    }

    /// Apply a probe outcome.
    ///
    /// Returns `true` when the online flag flipped.
    pub fn apply(&mut self, outcome: &Result<ProbeReport, ProbeError>, at: Timestamp) -> bool {
        let was_online = self.online;
        self.checking = false;
        self.last_check = Some(at);
        match outcome {
            Ok(report) => {
                self.online = true;
                self.error = None;
                self.details.clone_from(&report.details);
            }
            Err(err) => {
                self.online = false;
                self.error = Some(err.to_string());
            }
        }
        was_online != self.online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    #[test]
    fn should_start_offline_and_idle() {
        let status = ConnectionStatus::default();
        assert!(!status.online);
        assert!(!status.checking);
        assert!(status.last_check.is_none());
    }

    #[test]
    fn should_report_transition_when_first_probe_succeeds() {
        let mut status = ConnectionStatus::default();
        status.begin_check();
        let report = ProbeReport::default().with("version", "1.2");
        assert!(status.apply(&Ok(report), now()));
        assert!(status.online);
        assert!(!status.checking);
        assert_eq!(status.details["version"], "1.2");
    }

    #[test]
    fn should_not_report_transition_when_status_unchanged() {
        let mut status = ConnectionStatus::default();
        let failure = Err(ProbeError::Unreachable("refused".to_string()));
        assert!(!status.apply(&failure, now()));
        assert!(!status.apply(&failure, now()));
        assert_eq!(status.error.as_deref(), Some("unreachable: refused"));
    }

    #[test]
    fn should_keep_details_but_record_error_when_going_offline() {
        let mut status = ConnectionStatus::default();
        status.apply(&Ok(ProbeReport::default().with("name", "bridge")), now());
        let flipped = status.apply(&Err(ProbeError::Timeout(std::time::Duration::from_secs(5))), now());
        assert!(flipped);
        assert!(!status.online);
        assert_eq!(status.details["name"], "bridge");
        assert!(status.error.is_some());
    }

    #[test]
    fn should_skip_null_details() {
        let report = ProbeReport::default().with("uptime", Value::Null);
        assert!(report.details.is_empty());
    }

    #[test]
    fn should_serialize_status_in_camel_case() {
        let json = serde_json::to_value(ConnectionStatus::default()).unwrap();
        assert!(json.get("lastCheck").is_some());
        assert_eq!(json["online"], false);
    }
}
