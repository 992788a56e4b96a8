//! Probe port — a bounded reachability check against one backend service.

use std::future::Future;
use std::pin::Pin;

use homedash_domain::connection::ProbeReport;
use homedash_domain::error::ProbeError;

/// Boxed future returned by [`Probe::check`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeReport, ProbeError>> + Send + 'a>>;

/// Checks whether one backend is reachable and reports its metadata.
///
/// The connection monitor holds one probe per monitored service, so the
/// trait is object safe. The monitor applies its own deadline around each
/// call; implementations only need to bound their own IO.
pub trait Probe: Send + Sync {
    fn check(&self) -> ProbeFuture<'_>;
}
