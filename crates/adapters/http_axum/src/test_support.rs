//! Test harness: a bootstrapped core and request helpers.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use homedash_app::connection_monitor::Monitored;
use homedash_app::context::{AppContext, CoreConfig};
use homedash_app::ports::{Probe, ProbeFuture};
use homedash_domain::connection::{MonitoredService, ProbeReport, ServiceKind};
use homedash_domain::error::ProbeError;
use serde_json::Value;
use tower::ServiceExt;

use crate::state::AppState;

/// Probe with a fixed answer.
pub struct FixedProbe {
    online: bool,
}

impl Probe for FixedProbe {
    fn check(&self) -> ProbeFuture<'_> {
        let online = self.online;
        Box::pin(async move {
            if online {
                Ok(ProbeReport::default().with("version", "1.0"))
            } else {
                Err(ProbeError::Unreachable("connection refused".into()))
            }
        })
    }
}

pub struct Harness {
    pub context: AppContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::bootstrap(CoreConfig::default())
    }

    /// Core monitoring one bridge called `hue`.
    pub fn with_bridge(online: bool) -> Self {
        Self::bootstrap(CoreConfig {
            services: vec![Monitored::new(
                MonitoredService::new("hue", ServiceKind::Bridge),
                FixedProbe { online },
            )],
            ..CoreConfig::default()
        })
    }

    fn bootstrap(config: CoreConfig) -> Self {
        Self {
            context: AppContext::bootstrap(config).unwrap(),
        }
    }

    pub fn router(&self) -> Router {
        crate::router::build(AppState::new(&self.context))
    }
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a bodiless request and decode the JSON answer.
pub async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_json(response).await)
}
