//! `tidepool-server` serves the tidepool control plane and the ingress router.
//!
//! The control plane is a small JSON API over the lifecycle controller of `tidepool-core`:
//! `POST /create`, `POST /remove`, `GET|POST /list`, `POST /purge` and `GET /health`. In hostname
//! addressing mode the ingress router relays raw TCP connections to sandboxes by `Host` header.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handler;
pub mod ingress;
pub mod middleware;
pub mod payload;
pub mod route;
pub mod serve;
pub mod state;


//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use config::*;
pub use error::*;
pub use payload::*;
pub use serve::*;
pub use state::*;
