//! Backend proxy probe: `GET <url>/health`.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use homedash_app::ports::{Probe, ProbeFuture};
use homedash_domain::connection::ProbeReport;
use homedash_domain::error::ProbeError;

use crate::error::{HttpProbeError, classify};
use crate::transport::{TransportConfig, base_url, endpoint};

#[derive(Debug, Deserialize)]
struct Health {
    name: Option<String>,
    version: Option<String>,
    uptime: Option<serde_json::Value>,
}

pub struct ProxyProbe {
    client: reqwest::Client,
    health_url: Url,
    timeout: Duration,
}

impl ProxyProbe {
    /// # Errors
    ///
    /// Returns [`HttpProbeError`] if `url` is not a usable base URL or the
    /// HTTP client cannot be built.
    pub fn new(url: &str, transport: &TransportConfig) -> Result<Self, HttpProbeError> {
        Ok(Self {
            client: transport.build_client()?,
            health_url: endpoint(&base_url(url)?, &["health"]),
            timeout: transport.timeout,
        })
    }

    async fn fetch(&self) -> Result<ProbeReport, ProbeError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| classify(&err, self.timeout))?;
        let health: Health = response
            .json()
            .await
            .map_err(|err| classify(&err, self.timeout))?;

        Ok(ProbeReport::default()
            .with("name", health.name)
            .with("version", health.version)
            .with("uptime", health.uptime))
    }
}

impl Probe for ProxyProbe {
    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(self.fetch())
    }
}
