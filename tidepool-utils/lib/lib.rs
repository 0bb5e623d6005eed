//! `tidepool-utils` is a library containing general utilities for the tidepool project.

#![warn(missing_docs)]

pub mod defaults;
pub mod duration;
pub mod error;
pub mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use duration::*;
pub use error::*;
pub use term::*;
