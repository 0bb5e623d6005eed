use thiserror::Error;
use tidepool_core::{runtime::RuntimeError, TidepoolError};
use tidepool_server::ServerError;
use tidepool_utils::DurationError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a tidepool-cli operation.
pub type TidepoolCliResult<T> = Result<T, TidepoolCliError>;

/// An error that occurred while running a `tidepool` command.
#[derive(pretty_error_debug::Debug, Error)]
pub enum TidepoolCliError {
    /// The control plane answered with a non-success status.
    #[error("bad status code {status}: {message}")]
    BadStatus {
        /// The HTTP status code.
        status: u16,

        /// The error message from the response body, or the status reason.
        message: String,
    },

    /// A command line argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request to the control plane failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A sandbox operation failed locally, for example while parsing a token.
    #[error(transparent)]
    Core(#[from] TidepoolError),

    /// Starting or running the server failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The container runtime could not be reached.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A lifetime argument was not a valid duration.
    #[error(transparent)]
    Duration(#[from] DurationError),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
