//! Error types of the tidepool server and their HTTP mapping.

use std::path::PathBuf;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tidepool_core::{runtime::RuntimeError, TidepoolError};

use crate::payload::ErrorResponse;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a server operation.
pub type ServerResult<T> = Result<T, ServerError>;

/// An error raised while serving requests or starting the server.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ServerError {
    /// A sandbox operation failed.
    #[error(transparent)]
    Core(#[from] TidepoolError),

    /// The request body or query could not be parsed.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// The request took longer than the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// No route matches the request path.
    #[error("not found")]
    RouteNotFound,

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// No configuration file was found.
    #[error(
        "no configuration file found, an example was written to {}; copy it to a search path and adjust it",
        .example.display()
    )]
    ConfigNotFound {
        /// Where the example configuration was written.
        example: PathBuf,
    },

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed or rendered.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerError {
    /// The HTTP status the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Core(e) => core_status_code(e),
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServerError::RouteNotFound => StatusCode::NOT_FOUND,
            ServerError::Config(_)
            | ServerError::ConfigNotFound { .. }
            | ServerError::Io(_)
            | ServerError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn core_status_code(error: &TidepoolError) -> StatusCode {
    match error {
        TidepoolError::InvalidToken(_)
        | TidepoolError::InvalidArgument(_)
        | TidepoolError::InvalidDuration(_)
        | TidepoolError::MalformedRecord(_) => StatusCode::BAD_REQUEST,
        TidepoolError::HostnameTaken { .. } => StatusCode::CONFLICT,
        TidepoolError::PortsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TidepoolError::Runtime(RuntimeError::NotFound(_)) => StatusCode::NOT_FOUND,
        TidepoolError::Runtime(RuntimeError::Conflict(_)) => StatusCode::CONFLICT,
        TidepoolError::Runtime(_)
        | TidepoolError::CreateFailed(_)
        | TidepoolError::Task(_)
        | TidepoolError::InvalidPortRange { .. }
        | TidepoolError::RecordEncoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tidepool_core::{Compensation, CompensationStep, CreateFailure};

    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (
                ServerError::from(TidepoolError::InvalidToken("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::from(TidepoolError::PortsExhausted {
                    lower: 1,
                    upper: 2,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServerError::from(TidepoolError::Runtime(RuntimeError::NotFound("x".into()))),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(TidepoolError::Runtime(RuntimeError::Conflict("x".into()))),
                StatusCode::CONFLICT,
            ),
            (
                ServerError::from(TidepoolError::Runtime(RuntimeError::Other("x".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServerError::from(TidepoolError::CreateFailed(CreateFailure {
                    sandbox: "x".into(),
                    cause: RuntimeError::Other("boom".into()),
                    compensation: Compensation {
                        removal: CompensationStep::Succeeded,
                        released_port: None,
                    },
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServerError::Timeout, StatusCode::REQUEST_TIMEOUT),
            (ServerError::RouteNotFound, StatusCode::NOT_FOUND),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error);
        }
    }
}
