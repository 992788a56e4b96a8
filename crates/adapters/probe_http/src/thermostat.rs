//! Thermostat probe.
//!
//! The thermostat lives behind a rate-limited cloud API, so its health is
//! judged from the credentials alone: a present, unexpired access token.

use homedash_app::ports::{Probe, ProbeFuture};
use homedash_domain::connection::ProbeReport;
use homedash_domain::error::ProbeError;
use homedash_domain::time::{Timestamp, has_passed};

#[derive(Debug, Clone, Default)]
pub struct ThermostatCredentials {
    pub access_token: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub project_id: Option<String>,
}

pub struct ThermostatCredentialProbe {
    credentials: ThermostatCredentials,
}

impl ThermostatCredentialProbe {
    #[must_use]
    pub fn new(credentials: ThermostatCredentials) -> Self {
        Self { credentials }
    }

    fn validate(&self) -> Result<ProbeReport, ProbeError> {
        let has_token = self
            .credentials
            .access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        if !has_token {
            return Err(ProbeError::NotConfigured("thermostat access token".to_string()));
        }
        if let Some(expires_at) = self.credentials.expires_at
            && has_passed(expires_at)
        {
            return Err(ProbeError::Rejected(format!(
                "access token expired at {}",
                expires_at.to_rfc3339()
            )));
        }
        Ok(ProbeReport::default()
            .with("project", self.credentials.project_id.clone())
            .with("tokenExpiresAt", self.credentials.expires_at.map(|at| at.to_rfc3339())))
    }
}

impl Probe for ThermostatCredentialProbe {
    fn check(&self) -> ProbeFuture<'_> {
        let outcome = self.validate();
        Box::pin(async move { outcome })
    }
}
