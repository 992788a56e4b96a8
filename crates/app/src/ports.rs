//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the reactive core and the outside world.
//! They are defined here (in `app`) so that both the core and the adapter
//! crates can depend on them without creating circular dependencies.

pub mod integration;
pub mod probe;
pub mod snapshot_store;

pub use integration::Integration;
pub use probe::{Probe, ProbeFuture};
pub use snapshot_store::SnapshotStore;
