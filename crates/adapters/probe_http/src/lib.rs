//! # homedash-adapter-probe-http
//!
//! Reachability probes for the connection monitor.
//!
//! ## Responsibilities
//! - [`HueBridgeProbe`] — reads the bridge configuration over its local REST API
//! - [`ProxyProbe`] — reads a backend proxy's `/health` report
//! - [`ThermostatCredentialProbe`] — validates thermostat credentials locally
//! - Classify transport failures into `ProbeError` variants
//!
//! ## Dependency rule
//! Depends on `homedash-app` (for the `Probe` port) and `homedash-domain`.

pub mod error;
pub mod hue;
pub mod proxy;
pub mod thermostat;
pub mod transport;

pub use error::HttpProbeError;
pub use hue::HueBridgeProbe;
pub use proxy::ProxyProbe;
pub use thermostat::{ThermostatCredentialProbe, ThermostatCredentials};
pub use transport::TransportConfig;
