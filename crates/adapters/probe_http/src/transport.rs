//! Shared HTTP client settings for every probe.

use std::time::Duration;

use url::Url;

use crate::error::HttpProbeError;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("homedash/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProbeError::Client`] if the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client, HttpProbeError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(HttpProbeError::Client)
    }
}

/// Parse a probe target into a base URL, defaulting to `http://`.
///
/// Only `http`/`https` URLs with a host and without query or fragment
/// are accepted.
pub(crate) fn base_url(raw: &str) -> Result<Url, HttpProbeError> {
    let invalid = || HttpProbeError::InvalidUrl(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let url = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{trimmed}"))
    }
    .map_err(|_| invalid())?;

    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if !matches!(url.scheme(), "http" | "https")
        || !has_host
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return Err(invalid());
    }
    Ok(url)
}

/// Append path segments to `base`, escaping each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
