//! `tidepool-cli` holds the command line interface of tidepool: argument definitions, the HTTP
//! client for the control plane and the terminal rendering of sandboxes.

#![warn(missing_docs)]

mod args;
mod client;
mod error;
mod format;
mod styles;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use args::*;
pub use client::*;
pub use error::*;
pub use format::*;
pub use styles::*;
