//! # homedash-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a read-mostly **JSON API** the browser dashboard polls or
//!   subscribes to (`/api/state`, `/api/connections`, `/api/tasks`, …)
//! - Stream every event bus publish as **server-sent events**
//!   (`/api/events/stream`)
//! - Let the dashboard publish bus events (`POST /api/events/{topic}`),
//!   e.g. `light:set` requests answered by integrations
//!
//! ## Dependency rule
//! Depends on `homedash-app` (for the core services) and `homedash-domain`
//! (for the types serialized into responses). Never leaks axum types into
//! the core.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod test_support;
