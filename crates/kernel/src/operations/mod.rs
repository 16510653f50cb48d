//! Topology-mutating operations.
//!
//! Each operation validates and stages everything that can fail before the
//! first write to the [`EntityStore`](crate::topology::brep::EntityStore),
//! so an `Err` always leaves the store as it was.

pub mod reverse;
pub mod split;
pub mod wire;
