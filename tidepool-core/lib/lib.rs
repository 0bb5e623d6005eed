//! `tidepool-core` provisions short-lived, isolated container sandboxes and reclaims them once
//! they expire.
//!
//! # Overview
//!
//! Every sandbox is a single container owned by one `(owner, application)` pair. The crate keeps
//! no database: the only durable state is a small JSON record attached to each container as a
//! label, and everything else (deadlines, port usage, routes) is rebuilt from the container
//! runtime on demand.
//!
//! # Modules
//!
//! - [`ports`] - Circular next-fit allocator for host ports
//! - [`identity`] - Sandbox naming and the label record
//! - [`models`] - Request and result types shared with the control plane
//! - [`runtime`] - The container runtime abstraction and its Docker implementation
//! - [`management`] - The lifecycle controller and the ingress route table
//! - [`token`] - Owner extraction from access tokens
//! - [`clock`] - Time source used for expiry decisions

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod clock;
pub mod identity;
pub mod management;
pub mod models;
pub mod ports;
pub mod runtime;
pub mod token;

pub use error::*;
