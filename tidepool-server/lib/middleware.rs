//! Middleware of the control plane.
//!
//! - [`logging_middleware`] logs every request and the status it was answered with
//! - [`timeout_middleware`] aborts requests that exceed the configured request timeout

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{state::AppState, ServerError};

//--------------------------------------------------------------------------------------------------
// Middleware Functions
//--------------------------------------------------------------------------------------------------

/// Log incoming requests
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::info!("request: {} {}", method, uri);

    let response = next.run(req).await;

    tracing::info!("response: {} {}: {}", method, uri, response.status());

    response
}

/// Abort requests that run longer than the configured timeout.
///
/// Dropping the handler future cancels any container runtime call still in flight.
pub async fn timeout_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let timeout = *state.get_config().get_request_timeout();

    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("request exceeded {:?}", timeout);
            ServerError::Timeout.into_response()
        }
    }
}
