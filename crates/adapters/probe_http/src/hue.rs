//! Hue bridge probe.
//!
//! The bridge answers `GET /api/<username>/config` with its configuration
//! object. Failures come back as HTTP 200 with a JSON array of
//! `{"error": {"type", "address", "description"}}` entries.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use homedash_app::ports::{Probe, ProbeFuture};
use homedash_domain::connection::ProbeReport;
use homedash_domain::error::ProbeError;

use crate::error::{HttpProbeError, classify};
use crate::transport::{TransportConfig, base_url, endpoint};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigResponse {
    Errors(Vec<ErrorEntry>),
    Config(BridgeConfig),
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    description: String,
}

#[derive(Debug, Deserialize)]
struct BridgeConfig {
    name: Option<String>,
    swversion: Option<String>,
    apiversion: Option<String>,
}

pub struct HueBridgeProbe {
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    timeout: Duration,
}

impl HueBridgeProbe {
    /// Probe the bridge at `bridge` (host or URL) with an API `username`.
    ///
    /// A missing username is not an error here; every check then reports
    /// the bridge as not configured.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProbeError`] if `bridge` is not a usable address or
    /// the HTTP client cannot be built.
    pub fn new(
        bridge: &str,
        username: Option<String>,
        transport: &TransportConfig,
    ) -> Result<Self, HttpProbeError> {
        Ok(Self {
            client: transport.build_client()?,
            base_url: base_url(bridge)?,
            username: username.filter(|name| !name.trim().is_empty()),
            timeout: transport.timeout,
        })
    }

    async fn fetch(&self) -> Result<ProbeReport, ProbeError> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| ProbeError::NotConfigured("hue bridge username".to_string()))?;
        let url = endpoint(&self.base_url, &["api", username, "config"]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| classify(&err, self.timeout))?;
        let body: ConfigResponse = response
            .json()
            .await
            .map_err(|err| classify(&err, self.timeout))?;

        match body {
            ConfigResponse::Config(config) => Ok(ProbeReport::default()
                .with("name", config.name)
                .with("version", config.swversion)
                .with("apiVersion", config.apiversion)),
            ConfigResponse::Errors(entries) => {
                let description = entries
                    .into_iter()
                    .find_map(|entry| entry.error)
                    .map_or_else(|| "unknown bridge error".to_string(), |detail| detail.description);
                Err(ProbeError::Rejected(description))
            }
        }
    }
}

impl Probe for HueBridgeProbe {
    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(self.fetch())
    }
}
