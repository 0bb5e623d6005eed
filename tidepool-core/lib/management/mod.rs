//! Sandbox lifecycle management.
//!
//! This module ties the port pool, the label record and the container runtime together:
//! - [`Lifecycle`] creates, removes, lists, purges and resynchronizes sandboxes
//! - [`RouteTable`] maps routing keys of hostname-addressed sandboxes to their backends

mod lifecycle;
mod routes;

#[cfg(test)]
mod lifecycle_tests;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use lifecycle::*;
pub use routes::*;
