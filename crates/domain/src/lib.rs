//! # homedash-domain
//!
//! Pure domain model for the homedash reactive core.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **capabilities** (symbolic keys services are registered under)
//! - Define the **topic vocabulary** shared by the event bus and its consumers
//! - Define **events** (immutable publish records) and **state changes**
//! - Define **dotted paths** and the tree operations behind the state store
//! - Define **connection status** records for monitored backend services
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.

pub mod error;
pub mod id;
pub mod time;

pub mod capability;
pub mod connection;
pub mod event;
pub mod path;
pub mod state_change;
pub mod topic;
