//! Errors raised while setting probes up, and classification of request
//! failures into [`ProbeError`].

use std::time::Duration;

use homedash_domain::error::ProbeError;

#[derive(Debug, thiserror::Error)]
pub enum HttpProbeError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// A probe target is not a usable base URL.
    #[error("invalid base URL {0:?}")]
    InvalidUrl(String),
}

/// Map a failed request to the probe outcome the monitor records.
pub(crate) fn classify(err: &reqwest::Error, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        ProbeError::Rejected(format!("HTTP {status}"))
    } else if err.is_decode() {
        ProbeError::InvalidResponse(err.to_string())
    } else {
        ProbeError::Unreachable(root_cause(err))
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
